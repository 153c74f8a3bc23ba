//! Configuration module for the execution core
//!
//! Supports YAML configuration files with environment overrides and
//! programmatic construction through `Default`.

pub mod types;
pub mod loader;

pub use types::*;
pub use loader::*;
