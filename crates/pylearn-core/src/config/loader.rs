//! Configuration loader for YAML files and environment overrides
//!
//! Values are resolved in order: built-in defaults, the YAML document, then the
//! `PYLEARN_*` environment variables. The result is validated before use.

use crate::config::types::*;
use crate::errors::PylearnError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const ENV_EXECUTION_URL: &str = "PYLEARN_EXECUTION_URL";
pub const ENV_EXECUTION_TIMEOUT: &str = "PYLEARN_EXECUTION_TIMEOUT";
pub const ENV_BIND_ADDR: &str = "PYLEARN_BIND_ADDR";

/// Configuration loader with environment resolution
pub struct ConfigLoader;
impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<PylearnConfig, PylearnError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            PylearnError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<PylearnConfig, PylearnError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            log::info!("Loading configuration from file: {}", path.display());
            Self::from_file(path).await
        } else {
            log::info!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            Self::finish(PylearnConfig::default())
        }
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<PylearnConfig, PylearnError> {
        let config: PylearnConfig = if content.trim().is_empty() {
            PylearnConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| PylearnError::ConfigError(format!("Failed to parse YAML config: {}", e)))?
        };

        Self::finish(config)
    }

    fn finish(mut config: PylearnConfig) -> Result<PylearnConfig, PylearnError> {
        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PYLEARN_*` overrides
    fn resolve_environment(config: &mut PylearnConfig) -> Result<(), PylearnError> {
        if let Ok(url) = env::var(ENV_EXECUTION_URL) {
            log::debug!("Execution API URL overridden by {}", ENV_EXECUTION_URL);
            config.execution.api_url = url;
        }

        if let Ok(timeout) = env::var(ENV_EXECUTION_TIMEOUT) {
            config.execution.timeout_seconds = timeout.trim().parse().map_err(|e| {
                PylearnError::ConfigError(format!(
                    "Invalid {} value '{}': {}",
                    ENV_EXECUTION_TIMEOUT, timeout, e
                ))
            })?;
        }

        if let Ok(addr) = env::var(ENV_BIND_ADDR) {
            config.server.bind_addr = addr;
        }

        Ok(())
    }
}
