//! Run configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for a generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of candidate files to process
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Files at or above this coverage percentage are not candidates
    #[serde(default = "default_target_coverage")]
    pub target_coverage: f64,

    /// Language allow-list; empty means every language
    #[serde(default)]
    pub languages: Vec<String>,

    /// Glob patterns of paths never selected
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Test framework name, or "auto" to classify per file
    #[serde(default = "default_test_framework")]
    pub test_framework: String,

    /// Number of candidates processed in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Abort dispatching new candidates after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,

    /// Write merged test files; when false only report what would change
    #[serde(default = "default_apply")]
    pub apply: bool,

    /// Repository checkout the coverage paths are relative to
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,

    /// Directory receiving summary.json and changes.patch
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Source text beyond this many characters is truncated in prompts
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,

    /// Completion endpoint configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_files() -> usize {
    3
}

const fn default_target_coverage() -> f64 {
    80.0
}

fn default_test_framework() -> String {
    "auto".to_string()
}

const fn default_concurrency() -> usize {
    2
}

const fn default_apply() -> bool {
    true
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_tests")
}

const fn default_max_source_chars() -> usize {
    60_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            target_coverage: default_target_coverage(),
            languages: vec![],
            exclude_patterns: vec![],
            test_framework: default_test_framework(),
            concurrency: default_concurrency(),
            run_timeout_secs: None,
            apply: default_apply(),
            repo_root: default_repo_root(),
            output_dir: default_output_dir(),
            max_source_chars: default_max_source_chars(),
            model: ModelConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Completion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Model identifier sent with every request
    #[serde(default = "default_model_id")]
    pub id: String,

    /// Base URL of the chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus-sampling probability
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_id() -> String {
    "openai/gpt-4.1-mini".to_string()
}

fn default_endpoint() -> String {
    "https://models.github.ai/inference".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_top_p() -> f32 {
    1.0
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per candidate, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    2_000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed against the endpoint
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
}

const fn default_requests_per_second() -> f64 {
    1.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
