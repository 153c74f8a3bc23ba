//! Gateway to the remote sandboxed execution service (Piston API).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::normalizer::normalize;
use super::ExecutionStrategy;
use crate::config::ExecutionConfig;
use crate::core_types::{ExecutionResult, NormalizedRequest};
use crate::errors::ExecutionFailure;

pub const DEFAULT_API_URL: &str = "https://emkc.org/api/v2/piston/execute";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SOURCE_FILE_NAME: &str = "main.py";

/// Successful response body from the service, kept untyped until normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBackendResponse {
    pub body: Value,
    pub language_id: String,
    pub requested_version: String,
}

#[derive(Debug, Serialize)]
struct SourceFile<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ExecutePayload<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<SourceFile<'a>>,
    stdin: &'a str,
}

#[derive(Debug, Clone)]
pub struct RemoteExecutionGateway {
    client: Client,
    api_url: String,
    timeout: Duration,
    source_file_name: String,
}

impl RemoteExecutionGateway {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            timeout: DEFAULT_TIMEOUT,
            source_file_name: DEFAULT_SOURCE_FILE_NAME.to_string(),
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new(config.api_url.clone())
            .with_timeout(Duration::from_secs(config.timeout_seconds))
            .with_source_file_name(config.source_file_name.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_source_file_name(mut self, name: impl Into<String>) -> Self {
        self.source_file_name = name.into();
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issues exactly one call to the service, bounded by the configured timeout.
    pub async fn execute(&self, request: &NormalizedRequest) -> Result<RawBackendResponse, ExecutionFailure> {
        let payload = ExecutePayload {
            language: &request.language_id,
            version: &request.language_version,
            files: vec![SourceFile {
                name: &self.source_file_name,
                content: &request.source_text,
            }],
            stdin: &request.standard_input,
        };

        log::debug!(
            "Sending {} bytes of {} {} source to {}",
            request.source_text.len(),
            request.language_id,
            request.language_version,
            self.api_url
        );

        let body = match tokio::time::timeout(self.timeout, self.exchange(&payload)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                log::warn!("Execution API call to {} timed out after {:?}", self.api_url, self.timeout);
                return Err(ExecutionFailure::timeout(self.timeout));
            }
        };

        Ok(RawBackendResponse {
            body,
            language_id: request.language_id.clone(),
            requested_version: request.language_version.clone(),
        })
    }

    async fn exchange(&self, payload: &ExecutePayload<'_>) -> Result<Value, ExecutionFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let detail = error_chain(&e);
                log::error!("HTTP request to execution API failed: {}", detail);
                ExecutionFailure::network(detail)
            })?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ExecutionFailure::network(error_chain(&e)))?;

        log::debug!("Execution API response ({}): {} bytes", status, response_text.len());

        if !status.is_success() {
            log::warn!("Execution API rejected the run with status {}", status);
            return Err(ExecutionFailure::backend(status.as_u16(), response_text));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            log::error!("Execution API returned invalid JSON: {}", e);
            ExecutionFailure::invalid_response(format!("{}: {}", e, response_text))
        })
    }
}

/// Renders an error together with its sources, e.g. "error sending request: connection refused".
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Remote path as seen by the orchestrator: gateway call followed by normalization.
pub struct RemoteStrategy {
    gateway: Arc<RemoteExecutionGateway>,
}

impl RemoteStrategy {
    pub fn new(gateway: Arc<RemoteExecutionGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ExecutionStrategy for RemoteStrategy {
    fn name(&self) -> &str {
        "remote"
    }

    async fn execute(&self, request: &NormalizedRequest) -> Result<ExecutionResult, ExecutionFailure> {
        let raw = self.gateway.execute(request).await?;
        Ok(normalize(&raw))
    }
}
