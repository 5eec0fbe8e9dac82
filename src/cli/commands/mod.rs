//! Command handlers
//!
//! Each handler receives a validated configuration and renders its result
//! through [`crate::cli::display::output`].

pub mod generate;
pub mod inspect;
pub mod select;

use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, ConfigOverrides};
use crate::infrastructure::logging::{LogConfig, LoggerImpl};

/// Load and validate the layered configuration
pub fn load_config(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config> {
    ConfigLoader::load(explicit, overrides).context("Failed to load configuration")
}

/// Install the global subscriber described by `config.logging`
pub fn init_logging(config: &Config) -> Result<LoggerImpl> {
    let log_config = LogConfig::try_from(&config.logging).map_err(|e| anyhow::anyhow!(e))?;
    LoggerImpl::init(&log_config)
}
