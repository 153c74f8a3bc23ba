//! Error types for the HTTP boundary and their JSON error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use pylearn_core::{ExecutionFailure, PylearnError};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// A run that ended in the failure taxonomy
    #[error("{0}")]
    Execution(#[from] ExecutionFailure),

    /// Request body that could not be read as a run request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Lesson not found")]
    LessonNotFound,

    #[error("Content error: {0}")]
    Content(#[from] PylearnError),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::Execution(ExecutionFailure::ValidationError { .. }) => 400,
            ServerError::Execution(ExecutionFailure::BackendError { .. }) => 502,
            ServerError::LessonNotFound => 404,
            ServerError::Execution(_)
            | ServerError::InvalidRequest(_)
            | ServerError::Content(_)
            | ServerError::Config(_)
            | ServerError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Execution(failure) => failure.kind_name(),
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::LessonNotFound => "not_found",
            ServerError::Content(_) => "content_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }

    /// JSON body sent to the client.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ServerError::Execution(ExecutionFailure::ValidationError { message }) => {
                json!({ "error": message })
            }
            ServerError::Execution(ExecutionFailure::BackendError { message, detail, .. }) => {
                json!({ "error": message, "details": detail.clone().unwrap_or_default() })
            }
            ServerError::Execution(failure) => {
                let details = match failure.detail() {
                    Some(detail) => format!("{}: {}", failure.message(), detail),
                    None => failure.message().to_string(),
                };
                json!({ "error": "Failed to run code", "details": details })
            }
            ServerError::InvalidRequest(reason) => {
                json!({ "error": "Failed to run code", "details": reason })
            }
            ServerError::LessonNotFound => json!({ "error": "Lesson not found" }),
            ServerError::Content(_) => json!({ "error": "Failed to load lesson" }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            log::error!("{} ({}): {}", status, self.error_type(), self);
        } else {
            log::debug!("{} ({}): {}", status, self.error_type(), self);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_failures_map_to_route_contract() {
        let cases = [
            (ExecutionFailure::no_code(), 400),
            (ExecutionFailure::backend(503, "down"), 502),
            (ExecutionFailure::timeout(Duration::from_secs(15)), 500),
            (ExecutionFailure::network("connection refused"), 500),
            (ExecutionFailure::invalid_response("<html>"), 500),
        ];
        for (failure, status) in cases {
            assert_eq!(ServerError::from(failure).status_code(), status);
        }
    }

    #[test]
    fn test_error_bodies() {
        assert_eq!(
            ServerError::from(ExecutionFailure::no_code()).body(),
            json!({ "error": "No code provided" })
        );
        assert_eq!(
            ServerError::from(ExecutionFailure::backend(500, "internal error")).body(),
            json!({ "error": "Execution API error (500)", "details": "internal error" })
        );
        assert_eq!(
            ServerError::from(ExecutionFailure::network("connection refused")).body(),
            json!({ "error": "Failed to run code", "details": "Execution API request failed: connection refused" })
        );
        assert_eq!(ServerError::LessonNotFound.body(), json!({ "error": "Lesson not found" }));
        assert_eq!(
            ServerError::from(PylearnError::ContentError("bad yaml".into())).body(),
            json!({ "error": "Failed to load lesson" })
        );
    }
}
