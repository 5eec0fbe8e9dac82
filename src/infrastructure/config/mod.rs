//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML project files and an explicit `--config` file
//! - Environment variable overrides
//! - Command-line overrides
//! - Validation before any work starts

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, ConfigOverrides, LoggingOverrides, ModelOverrides};
