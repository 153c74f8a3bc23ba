//! Shared test doubles: an in-process execution service and a scripted interpreter engine.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use pylearn_core::errors::EngineError;
use pylearn_core::executors::local::CAPTURE_OBJECT;
use pylearn_core::executors::{EngineLoader, InterpreterEngine};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub enum Behaviour {
    Json(Value),
    Status(u16, String),
    Delay(Duration, Value),
    Raw(String),
}

#[derive(Clone)]
struct MockState {
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
}

pub struct MockBackend {
    pub url: String,
    calls: Arc<AtomicUsize>,
    last_body: Arc<Mutex<Option<Value>>>,
}

impl MockBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Value> {
        self.last_body.lock().unwrap().clone()
    }
}

async fn execute_handler(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock().unwrap() = Some(body);

    match state.behaviour {
        Behaviour::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        Behaviour::Status(code, text) => (StatusCode::from_u16(code).unwrap(), text).into_response(),
        Behaviour::Delay(delay, value) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, Json(value)).into_response()
        }
        Behaviour::Raw(text) => (StatusCode::OK, text).into_response(),
    }
}

/// Starts a fake Piston-style service on an ephemeral port.
pub async fn spawn_backend(behaviour: Behaviour) -> MockBackend {
    let calls = Arc::new(AtomicUsize::new(0));
    let last_body = Arc::new(Mutex::new(None));
    let state = MockState {
        behaviour,
        calls: calls.clone(),
        last_body: last_body.clone(),
    };
    let app = Router::new()
        .route("/api/v2/execute", post(execute_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend {
        url: format!("http://{}/api/v2/execute", addr),
        calls,
        last_body,
    }
}

/// URL on which nothing is listening.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/v2/execute", addr)
}

/// Engine that "prints" every source line verbatim, and raises on lines starting with `raise `.
#[derive(Default)]
pub struct ScriptedEngine {
    buffer: Mutex<String>,
}

#[async_trait]
impl InterpreterEngine for ScriptedEngine {
    fn version(&self) -> &str {
        "3.11.4"
    }

    async fn run_source(&self, source: &str) -> Result<(), EngineError> {
        if source.starts_with(&format!("{}.reset(", CAPTURE_OBJECT)) {
            self.buffer.lock().unwrap().clear();
            return Ok(());
        }
        for line in source.lines() {
            if let Some(message) = line.strip_prefix("raise ") {
                return Err(EngineError::Exception(message.to_string()));
            }
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push_str(line);
            buffer.push('\n');
        }
        Ok(())
    }

    async fn evaluate(&self, _expression: &str) -> Result<String, EngineError> {
        Ok(self.buffer.lock().unwrap().clone())
    }
}

pub struct ScriptedLoader;

#[async_trait]
impl EngineLoader for ScriptedLoader {
    async fn load(&self) -> Result<Arc<dyn InterpreterEngine>, EngineError> {
        Ok(Arc::new(ScriptedEngine::default()))
    }
}
