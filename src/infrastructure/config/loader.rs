//! Layered configuration loading with figment and validation of the result.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::{Language, TestFramework};
use crate::domain::PipelineError;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment could not extract the layered sources
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// An explicitly requested file does not exist
    #[error("Configuration file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// `max_files` is zero
    #[error("Invalid max_files: {0}. Must be at least 1")]
    InvalidMaxFiles(usize),

    /// `target_coverage` is outside `[0, 100]`
    #[error("Invalid target_coverage: {0}. Must be within [0, 100]")]
    InvalidTargetCoverage(f64),

    /// `concurrency` is outside `[1, 32]`
    #[error("Invalid concurrency: {0}. Must be between 1 and 32")]
    InvalidConcurrency(usize),

    /// Sampling temperature is outside `[0, 2]`
    #[error("Invalid temperature: {0}. Must be within [0, 2]")]
    InvalidTemperature(f32),

    /// `top_p` is outside `(0, 1]`
    #[error("Invalid top_p: {0}. Must be within (0, 1]")]
    InvalidTopP(f32),

    /// `max_tokens` is zero
    #[error("Invalid max_tokens: {0}. Must be at least 1")]
    InvalidMaxTokens(u32),

    /// Retry policy allows no attempts
    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    /// Initial backoff exceeds the cap
    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    /// Request rate is not positive
    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    /// An exclude glob does not compile
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending glob
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Unknown language filter
    #[error("Invalid language '{0}'")]
    InvalidLanguage(String),

    /// Unknown test framework name
    #[error("Invalid test framework '{0}'. Use \"auto\" or a known framework name")]
    InvalidTestFramework(String),

    /// Unknown log level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown rotation policy
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// A cross-field check failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

/// Command-line values layered on top of every other source.
///
/// Unset fields leave the lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    /// Override for `max_files`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Override for `target_coverage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_coverage: Option<f64>,
    /// Override for the language filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    /// Override for the exclude globs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    /// Forced test framework
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_framework: Option<String>,
    /// Override for worker concurrency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Override for the run deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
    /// Write merged artifacts when true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply: Option<bool>,
    /// Repository root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<PathBuf>,
    /// Directory for run artifacts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Model settings to override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelOverrides>,
    /// Logging settings to override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingOverrides>,
}

/// Model fields settable from the command line
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelOverrides {
    /// Model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Completion endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Logging fields settable from the command line
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggingOverrides {
    /// Log level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Console format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration relative to the current directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .covgen/config.yaml (project config)
    /// 3. .covgen/local.yaml (local overrides, optional)
    /// 4. An explicit `--config` file, which must exist
    /// 5. Environment variables (COVGEN_* prefix, `__` separates sections)
    /// 6. Command-line overrides
    pub fn load(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
        Self::load_from(Path::new("."), explicit, overrides)
    }

    /// Load configuration with project files resolved under `base_dir`
    pub fn load_from(
        base_dir: &Path,
        explicit: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Config, ConfigError> {
        let project_dir = base_dir.join(".covgen");

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(project_dir.join("config.yaml")))
            .merge(Yaml::file(project_dir.join("local.yaml")));

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Config = figment
            .merge(Env::prefixed("COVGEN_").split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_files == 0 {
            return Err(ConfigError::InvalidMaxFiles(config.max_files));
        }

        if !config.target_coverage.is_finite() || !(0.0..=100.0).contains(&config.target_coverage) {
            return Err(ConfigError::InvalidTargetCoverage(config.target_coverage));
        }

        if config.concurrency == 0 || config.concurrency > 32 {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }

        if config.max_source_chars == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_source_chars must be at least 1".to_string(),
            ));
        }

        // Model sampling
        let model = &config.model;
        if !model.temperature.is_finite() || !(0.0..=2.0).contains(&model.temperature) {
            return Err(ConfigError::InvalidTemperature(model.temperature));
        }
        if !model.top_p.is_finite() || model.top_p <= 0.0 || model.top_p > 1.0 {
            return Err(ConfigError::InvalidTopP(model.top_p));
        }
        if model.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(model.max_tokens));
        }
        if model.id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("model id cannot be empty".to_string()));
        }
        if model.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model endpoint cannot be empty".to_string(),
            ));
        }
        if model.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "model timeout_secs must be at least 1".to_string(),
            ));
        }

        // Retry and rate limit
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }
        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }
        let rps = config.rate_limit.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(rps));
        }

        // Selection filters
        for pattern in &config.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        for language in &config.languages {
            language
                .parse::<Language>()
                .map_err(|_| ConfigError::InvalidLanguage(language.clone()))?;
        }
        if !config.test_framework.eq_ignore_ascii_case("auto")
            && config.test_framework.parse::<TestFramework>().is_err()
        {
            return Err(ConfigError::InvalidTestFramework(config.test_framework.clone()));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
