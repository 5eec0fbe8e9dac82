//! Domain data types.

pub mod candidate;
pub mod config;
pub mod coverage;
pub mod generation;
pub mod structure;
pub mod summary;

pub use candidate::CandidateFile;
pub use config::{Config, LoggingConfig, ModelConfig, RateLimitConfig, RetryConfig};
pub use coverage::{CoverageReport, FileCoverage, Language};
pub use generation::{GenerationRequest, GenerationResult, TestFramework, ValidationStatus};
pub use structure::{ClassInfo, CodeStructure, FunctionInfo, LineRange};
pub use summary::{CandidateState, FileOutcome, OutcomeStatus, PipelineSummary, RunStatus};
