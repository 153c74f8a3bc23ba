//! Core type definitions for the run contract
//!
//! These types are the shared vocabulary between the editing surface, the
//! execution backends and the HTTP boundary. A request is created fresh for
//! every run and a result is produced once per completed run; nothing here is
//! persisted.

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionFailure;

pub const DEFAULT_LANGUAGE: &str = "python";
pub const DEFAULT_LANGUAGE_VERSION: &str = "3.10.0";

/// A run request as received from the editor. Language fields are optional.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub source_text: String,
    #[serde(default)]
    pub standard_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_version: Option<String>,
}

impl ExecutionRequest {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            ..Default::default()
        }
    }

    pub fn with_stdin(mut self, standard_input: impl Into<String>) -> Self {
        self.standard_input = standard_input.into();
        self
    }

    pub fn with_language(mut self, language_id: impl Into<String>, version: impl Into<String>) -> Self {
        self.language_id = Some(language_id.into());
        self.language_version = Some(version.into());
        self
    }
}

/// A request that passed validation: source is non-blank, language fields are filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub source_text: String,
    pub standard_input: String,
    pub language_id: String,
    pub language_version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub standard_output: String,
    pub standard_error: String,
    pub combined_output: String,
    pub exit_code: i64,
    pub exit_signal: Option<String>,
    pub language_id: String,
    pub language_version_used: String,
}

/// Run status of one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Succeeded(ExecutionResult),
    Failed(ExecutionFailure),
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded(_) | ExecutionStatus::Failed(_))
    }
}

/// What a caller gets back from one run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded(ExecutionResult),
    Failed(ExecutionFailure),
    /// Another run was in flight; this request produced nothing.
    Rejected,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }

    /// Human-readable text for the output panel.
    pub fn display_text(&self) -> String {
        match self {
            RunOutcome::Succeeded(result) => {
                if result.combined_output.is_empty() {
                    "(no output)".to_string()
                } else {
                    result.combined_output.clone()
                }
            }
            RunOutcome::Failed(failure) => match failure {
                ExecutionFailure::ValidationError { message } => message.clone(),
                ExecutionFailure::TransportError { .. } | ExecutionFailure::BackendError { .. } => {
                    format!("Cloud run error: {}", failure.message())
                }
                ExecutionFailure::InterpreterError { .. } => {
                    format!("Local run error: {}", failure.message())
                }
            },
            RunOutcome::Rejected => "A run is already in progress. Please wait.".to_string(),
        }
    }
}
