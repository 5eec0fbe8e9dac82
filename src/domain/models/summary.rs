//! Candidate lifecycle and the run summary artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::generation::ValidationStatus;
use crate::domain::error::PipelineError;

/// Processing state of one candidate
///
/// ```text
/// Selected → StructureExtracted → PromptBuilt → ModelInvoked → Validated → Merged
///                                                     │             │
///                                                     └──→ Skipped ←┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    /// Picked for generation
    Selected,
    /// Structure is known
    StructureExtracted,
    /// Prompt is ready
    PromptBuilt,
    /// Model responded
    ModelInvoked,
    /// Response was validated
    Validated,
    /// Tests were merged
    Merged,
    /// Dropped with a reason
    Skipped,
}

impl CandidateState {
    /// Whether no further transition is allowed
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Merged | Self::Skipped)
    }

    /// Check whether `self → next` is a legal transition
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Selected, Self::StructureExtracted)
                | (Self::StructureExtracted, Self::PromptBuilt)
                | (Self::PromptBuilt, Self::ModelInvoked)
                | (Self::ModelInvoked, Self::Validated | Self::Skipped)
                | (Self::Validated, Self::Merged | Self::Skipped)
                // cancellation before any work started
                | (Self::Selected, Self::Skipped)
        )
    }

    /// Advance to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: Self) -> Result<(), PipelineError> {
        if !self.can_transition_to(next) {
            return Err(PipelineError::InvalidStateTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Selected => "selected",
            Self::StructureExtracted => "structure_extracted",
            Self::PromptBuilt => "prompt_built",
            Self::ModelInvoked => "model_invoked",
            Self::Validated => "validated",
            Self::Merged => "merged",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Terminal status reported per file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Tests were merged
    Merged,
    /// No tests were merged
    Skipped,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => f.write_str("merged"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

/// Per-file entry of the summary artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Source path
    pub path: String,
    /// Coverage percentage before the run
    pub coverage_before: f64,
    /// Outcome
    pub status: OutcomeStatus,
    /// Tests merged
    pub tests_added: usize,
    /// Artifact that received the tests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    /// Validation outcome, when the model answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    /// Names of the merged tests
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub test_names: BTreeSet<String>,
    /// Why the file was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Unified diff of the artifact, kept out of the JSON summary
    #[serde(skip)]
    pub patch: Option<String>,
    /// False when the candidate was never handed to a worker
    #[serde(skip)]
    pub dispatched: bool,
}

impl FileOutcome {
    /// Outcome for a file skipped for `reason`
    pub fn skipped(path: impl Into<String>, coverage_before: f64, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            coverage_before,
            status: OutcomeStatus::Skipped,
            tests_added: 0,
            test_file: None,
            validation_status: None,
            test_names: BTreeSet::new(),
            reason: Some(reason.into()),
            patch: None,
            dispatched: true,
        }
    }
}

/// Overall run status, distinct from per-file status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every dispatched candidate finished
    Completed,
    /// No candidate passed selection
    NothingToDo,
    /// Stopped by cancellation or deadline
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::NothingToDo => f.write_str("nothing_to_do"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Aggregated result of a run. Append-only while the run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// Overall status
    pub status: RunStatus,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Finish time, once the run ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Model identifier
    pub model: String,
    /// Candidates dispatched
    pub files_processed: usize,
    /// Tests merged across all files
    pub tests_generated: usize,
    /// Per-file outcomes
    pub details: Vec<FileOutcome>,
}

impl PipelineSummary {
    /// Start a summary for a run against `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: None,
            model: model.into(),
            files_processed: 0,
            tests_generated: 0,
            details: Vec::new(),
        }
    }

    /// Record one finished candidate
    pub fn record(&mut self, outcome: FileOutcome) {
        if outcome.dispatched {
            self.files_processed += 1;
        }
        if outcome.status == OutcomeStatus::Merged {
            self.tests_generated += outcome.tests_added;
        }
        self.details.push(outcome);
    }

    /// Close the summary, ordering details by path for stable output
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.details.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Files that received tests
    pub fn merged_count(&self) -> usize {
        self.details
            .iter()
            .filter(|d| d.status == OutcomeStatus::Merged)
            .count()
    }
}
