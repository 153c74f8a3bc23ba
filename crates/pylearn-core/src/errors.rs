//! Error types for the execution core
//!
//! `ExecutionFailure` is the run taxonomy every execution path reports through:
//! each component converts its own faults into one of its variants before the
//! value crosses a component boundary. `PylearnError` covers everything that is
//! not a run outcome (configuration and content files).

use std::fmt;
use thiserror::Error;

pub const NO_CODE_MESSAGE: &str = "No code provided";

/// Why the transport to the remote execution service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Network,
    InvalidResponse,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

/// Why the local interpreter could not produce output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterErrorKind {
    NotReady,
    LoadFailed,
    Exception,
}

impl fmt::Display for InterpreterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpreterErrorKind::NotReady => write!(f, "not ready"),
            InterpreterErrorKind::LoadFailed => write!(f, "load failed"),
            InterpreterErrorKind::Exception => write!(f, "exception"),
        }
    }
}

/// Terminal failure of a single run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    #[error("{message}")]
    ValidationError { message: String },
    #[error("{message}")]
    TransportError {
        kind: TransportErrorKind,
        message: String,
        detail: Option<String>,
    },
    #[error("{message}")]
    BackendError {
        status: u16,
        message: String,
        detail: Option<String>,
    },
    #[error("{message}")]
    InterpreterError {
        kind: InterpreterErrorKind,
        message: String,
        detail: Option<String>,
    },
}

impl ExecutionFailure {
    pub fn no_code() -> Self {
        ExecutionFailure::ValidationError {
            message: NO_CODE_MESSAGE.to_string(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        ExecutionFailure::TransportError {
            kind: TransportErrorKind::Timeout,
            message: format!("Execution API request timed out after {}s", after.as_secs_f64()),
            detail: None,
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        ExecutionFailure::TransportError {
            kind: TransportErrorKind::Network,
            message: "Execution API request failed".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn invalid_response(detail: impl Into<String>) -> Self {
        ExecutionFailure::TransportError {
            kind: TransportErrorKind::InvalidResponse,
            message: "Execution API returned an unreadable response".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        ExecutionFailure::BackendError {
            status,
            message: format!("Execution API error ({})", status),
            detail: Some(body.into()),
        }
    }

    pub fn not_ready() -> Self {
        ExecutionFailure::InterpreterError {
            kind: InterpreterErrorKind::NotReady,
            message: "Local Python is still loading. Please wait.".to_string(),
            detail: None,
        }
    }

    pub fn load_failed(detail: impl Into<String>) -> Self {
        ExecutionFailure::InterpreterError {
            kind: InterpreterErrorKind::LoadFailed,
            message: "Failed to load Python interpreter".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn exception(message: impl Into<String>, partial_output: Option<String>) -> Self {
        ExecutionFailure::InterpreterError {
            kind: InterpreterErrorKind::Exception,
            message: message.into(),
            detail: partial_output.filter(|s| !s.is_empty()),
        }
    }

    pub fn engine_stopped(detail: impl Into<String>) -> Self {
        ExecutionFailure::InterpreterError {
            kind: InterpreterErrorKind::Exception,
            message: "Local Python stopped unexpectedly".to_string(),
            detail: Some(detail.into()),
        }
    }

    /// Tag name of the failure, as used in the run taxonomy.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExecutionFailure::ValidationError { .. } => "ValidationError",
            ExecutionFailure::TransportError { .. } => "TransportError",
            ExecutionFailure::BackendError { .. } => "BackendError",
            ExecutionFailure::InterpreterError { .. } => "InterpreterError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutionFailure::ValidationError { message }
            | ExecutionFailure::TransportError { message, .. }
            | ExecutionFailure::BackendError { message, .. }
            | ExecutionFailure::InterpreterError { message, .. } => message,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ExecutionFailure::ValidationError { .. } => None,
            ExecutionFailure::TransportError { detail, .. }
            | ExecutionFailure::BackendError { detail, .. }
            | ExecutionFailure::InterpreterError { detail, .. } => detail.as_deref(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum PylearnError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Content error: {0}")]
    ContentError(String),
}

// Specific error for the interpreter engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Interpreter could not be loaded: {0}")]
    Load(String),
    #[error("{0}")]
    Exception(String),
    #[error("Interpreter protocol error: {0}")]
    Protocol(String),
    #[error("I/O error talking to the interpreter: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed interpreter reply: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// The interpreter process is gone or its pipes are out of step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Protocol(_) | EngineError::Io(_) | EngineError::Json(_)
        )
    }
}
