//! HTTP boundary for the PyLearn execution core
//!
//! Exposes the run endpoint used by the lesson editor, the lesson content
//! endpoint and a health check. The run endpoint goes through validation, the
//! remote gateway and the normalizer only; the local fallback is a concern of
//! an editing session, not of a stateless HTTP call.

pub mod error;

pub use error::{Result, ServerError};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use pylearn_core::executors::{normalize, validate};
use pylearn_core::lessons::Lesson;
use pylearn_core::{
    ExecutionRequest, ExecutionResult, LessonStore, PylearnConfig, RemoteExecutionGateway, ServerSettings,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Body of `POST /api/run`. A missing or null field counts as empty.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl From<RunRequest> for ExecutionRequest {
    fn from(request: RunRequest) -> Self {
        ExecutionRequest {
            source_text: request.code.unwrap_or_default(),
            standard_input: request.stdin.unwrap_or_default(),
            language_id: request.language,
            language_version: request.version,
        }
    }
}

/// Successful body of `POST /api/run`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RunResponse {
    pub stdout: String,
    pub stderr: String,
    pub output: String,
    pub code: i64,
    pub signal: Option<String>,
    pub language: String,
    pub version: String,
}

impl From<ExecutionResult> for RunResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            stdout: result.standard_output,
            stderr: result.standard_error,
            output: result.combined_output,
            code: result.exit_code,
            signal: result.exit_signal,
            language: result.language_id,
            version: result.language_version_used,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server settings from the `server` section of the configuration file.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        let mut config = Self::default()
            .with_bind_addr_str(&settings.bind_addr)?
            .with_cors(settings.enable_cors)
            .with_max_body_size(settings.max_body_size);
        config.cors_origins = settings.cors_origins.clone();
        Ok(config)
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<RemoteExecutionGateway>,
    pub lessons: LessonStore,
}

/// Handler for `POST /api/run`.
async fn run_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<RunResponse>> {
    let request: RunRequest = serde_json::from_slice(&body).map_err(|e| {
        log::warn!("Unreadable run request: {}", e);
        ServerError::invalid_request(e.to_string())
    })?;

    let normalized = validate(&request.into())?;
    log::info!(
        "Running {} bytes of {} {}",
        normalized.source_text.len(),
        normalized.language_id,
        normalized.language_version
    );

    let raw = state.gateway.execute(&normalized).await?;
    let result = normalize(&raw);
    log::info!("Run finished with exit code {}", result.exit_code);
    Ok(Json(result.into()))
}

/// Handler for `GET /api/lessons/{module}/{lesson}`.
async fn lesson_handler(
    State(state): State<AppState>,
    Path((module, lesson)): Path<(String, String)>,
) -> Result<Json<Lesson>> {
    log::debug!("Loading lesson {}/{}", module, lesson);
    state
        .lessons
        .load(&module, &lesson)
        .await?
        .map(Json)
        .ok_or(ServerError::LessonNotFound)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub struct PylearnServer {
    state: AppState,
    config: ServerConfig,
}

impl PylearnServer {
    pub fn new(gateway: Arc<RemoteExecutionGateway>, lessons: LessonStore) -> Self {
        Self::with_config(gateway, lessons, ServerConfig::default())
    }

    pub fn with_config(gateway: Arc<RemoteExecutionGateway>, lessons: LessonStore, config: ServerConfig) -> Self {
        Self {
            state: AppState { gateway, lessons },
            config,
        }
    }

    /// Wires the gateway, lesson store and server settings from a loaded configuration.
    pub fn from_config(config: &PylearnConfig) -> Result<Self> {
        let server_config = ServerConfig::from_settings(&config.server)?;
        let gateway = Arc::new(RemoteExecutionGateway::from_config(&config.execution));
        let lessons = LessonStore::new(config.server.content_dir.clone());
        Ok(Self::with_config(gateway, lessons, server_config))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/api/run", post(run_handler))
            .route("/api/lessons/{module}/{lesson}", get(lesson_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(self.state.clone());

        router = router.layer(middleware::from_fn(
            |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                let request_id = uuid::Uuid::new_v4().to_string();
                let method = request.method().clone();
                let uri = request.uri().clone();

                // health probes are noisy
                let quiet = uri.path() == "/health";
                if quiet {
                    log::debug!("Request {} {} {}", request_id, method, uri);
                } else {
                    log::info!("Request {} {} {}", request_id, method, uri);
                }

                let start = std::time::Instant::now();
                let response = next.run(request).await;
                let duration = start.elapsed();

                if quiet {
                    log::debug!("Response {} {} in {:?}", request_id, response.status(), duration);
                } else {
                    log::info!("Response {} {} in {:?}", request_id, response.status(), duration);
                }
                response
            },
        ));

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = match &self.config.cors_origins {
                Some(origins) => {
                    let origins: std::result::Result<Vec<_>, _> = origins.iter().map(|s| s.parse()).collect();
                    match origins {
                        Ok(origins) => CorsLayer::new()
                            .allow_origin(origins)
                            .allow_methods(Any)
                            .allow_headers(Any),
                        Err(e) => {
                            log::warn!("Invalid CORS origin ({}), allowing any origin", e);
                            CorsLayer::permissive()
                        }
                    }
                }
                None => CorsLayer::permissive(),
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server; it shuts down when `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr).await.map_err(|e| {
            ServerError::config_error(format!("Failed to bind to {}: {}", self.config.bind_addr, e))
        })?;

        log::info!("PyLearn server listening on {}", self.config.bind_addr);
        log::info!("Run endpoint: http://{}/api/run", self.config.bind_addr);
        log::info!(
            "Execution API: {} (timeout {:?})",
            self.state.gateway.api_url(),
            self.state.gateway.timeout()
        );
        log::info!("Lesson content: {}", self.state.lessons.content_dir().display());

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("PyLearn server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
