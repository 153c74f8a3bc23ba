//! Configuration type definitions for the execution core and its server
//!
//! Every section is optional in YAML and falls back to defaults that match the
//! public Piston instance and a local Python interpreter, so an empty file (or
//! no file at all) gives a working setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core_types::{DEFAULT_LANGUAGE, DEFAULT_LANGUAGE_VERSION};
use crate::errors::PylearnError;
use crate::executors::remote::{DEFAULT_API_URL, DEFAULT_SOURCE_FILE_NAME};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PylearnConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote execution service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_source_file_name")]
    pub source_file_name: String,
}

/// Which path a session prefers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunnerMode {
    /// Remote service first, local interpreter as optional fallback.
    #[default]
    Remote,
    /// Local interpreter only.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Try the local interpreter when the remote path fails.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: RunnerMode,
    /// Interpreter to use instead of searching PATH for python3/python.
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_seconds: default_timeout_seconds(),
            language: default_language(),
            version: default_version(),
            source_file_name: default_source_file_name(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: RunnerMode::default(),
            interpreter: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            content_dir: default_content_dir(),
            enable_cors: true,
            cors_origins: None,
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_api_url() -> String { DEFAULT_API_URL.to_string() }
fn default_timeout_seconds() -> u64 { 15 }
fn default_language() -> String { DEFAULT_LANGUAGE.to_string() }
fn default_version() -> String { DEFAULT_LANGUAGE_VERSION.to_string() }
fn default_source_file_name() -> String { DEFAULT_SOURCE_FILE_NAME.to_string() }
fn default_bind_addr() -> String { "127.0.0.1:3000".to_string() }
fn default_content_dir() -> PathBuf { PathBuf::from("content") }
fn default_max_body_size() -> usize { 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl PylearnConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PylearnError> {
        let execution = &self.execution;
        if execution.api_url.trim().is_empty() {
            return Err(PylearnError::ConfigError("Execution api_url cannot be empty".to_string()));
        }

        if !execution.api_url.starts_with("http://") && !execution.api_url.starts_with("https://") {
            return Err(PylearnError::ConfigError(format!(
                "Execution api_url must be an http(s) URL, got '{}'",
                execution.api_url
            )));
        }

        if execution.timeout_seconds == 0 {
            return Err(PylearnError::ConfigError("Execution timeout_seconds must be greater than 0".to_string()));
        }

        if execution.language.trim().is_empty() || execution.version.trim().is_empty() {
            return Err(PylearnError::ConfigError("Execution language and version cannot be empty".to_string()));
        }

        if execution.source_file_name.trim().is_empty() {
            return Err(PylearnError::ConfigError("Execution source_file_name cannot be empty".to_string()));
        }

        if self.server.max_body_size == 0 {
            return Err(PylearnError::ConfigError("Server max_body_size must be greater than 0".to_string()));
        }

        Ok(())
    }
}
