//! Pipeline error type.

use std::path::PathBuf;
use thiserror::Error;

use super::models::generation::ValidationStatus;
use super::models::summary::CandidateState;

/// Error taxonomy of the generation pipeline.
///
/// `InvalidConfiguration`, `IngestionFailure` and `RunLocked` are fatal and
/// stop the run before a summary exists. Every other variant is contained to
/// the candidate it occurred on.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Settings are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Coverage data could not be read
    #[error("Coverage ingestion failed: {0}")]
    IngestionFailure(String),

    /// The model call failed permanently
    #[error("Model failure: {0}")]
    ModelFailure(String),

    /// The model call failed after exhausting retries
    #[error("Transient model failure: {0}")]
    TransientFailure(String),

    /// The response did not yield valid code
    #[error("Validation failed: {0}")]
    ValidationFailure(ValidationStatus),

    /// The run was cancelled
    #[error("Cancelled before completion")]
    Cancelled,

    /// The run lock is held by another process
    #[error("Another run holds the lock at {}", .0.display())]
    RunLocked(PathBuf),

    /// A candidate moved against its state machine
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// State before
        from: CandidateState,
        /// Requested state
        to: CandidateState,
    },

    /// Filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Returns true if this error aborts the whole run
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_) | Self::IngestionFailure(_) | Self::RunLocked(_)
        )
    }

    /// I/O error on `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
