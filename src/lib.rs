//! Covgen - coverage-gap unit test generator
//!
//! Covgen reads a coverage report, ranks the least covered source files, asks a
//! chat-completion model for unit tests covering them, validates the replies
//! and merges new tests into each file's test artifact.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Data model, error taxonomy and ports
//! - **Application Layer** (`application`): Run orchestration and the per-file state machine
//! - **Service Layer** (`services`): Selection, extraction, prompting, validation and merging
//! - **Infrastructure Layer** (`infrastructure`): Coverage ingestion, model client, config, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use covgen::{ConfigLoader, ConfigOverrides, ModelsHttpClient, PipelineOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load(None, &ConfigOverrides::default())?;
//!     let client = ModelsHttpClient::from_config(&config.model)?;
//!     let orchestrator = PipelineOrchestrator::new(Arc::new(config), Arc::new(client));
//!     let report = orchestrator.run("coverage.json".as_ref(), CancellationToken::new()).await?;
//!     println!("{} tests generated", report.summary.tests_generated);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{CandidateProcessor, PipelineOrchestrator, ProgressEvent, RunReport};
pub use domain::models::{
    CandidateFile, CodeStructure, Config, CoverageReport, FileCoverage, FileOutcome,
    GenerationResult, Language, LoggingConfig, ModelConfig, OutcomeStatus, PipelineSummary,
    RunStatus, TestFramework, ValidationStatus,
};
pub use domain::ports::{CompletionClient, CompletionRequest, InferenceError};
pub use domain::{PipelineError, PipelineResult};
pub use infrastructure::config::{ConfigError, ConfigLoader, ConfigOverrides};
pub use infrastructure::coverage::CoverageIngester;
pub use infrastructure::inference::ModelsHttpClient;
pub use services::{FileSelector, ResponseValidator, StructureExtractor, TestLocator, TestMerger};
