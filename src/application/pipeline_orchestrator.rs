//! Pipeline orchestrator with a bounded worker pool
//!
//! Sequences ingestion, selection and per-candidate processing, then writes
//! the run artifacts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            PipelineOrchestrator              │
//! ├──────────────────────────────────────────────┤
//! │ - FileSelector (ranked candidates)           │
//! │ - Artifact groups (one worker per artifact)  │
//! │ - Worker pool (Semaphore + JoinSet)          │
//! │ - Run token (operator cancel, run timeout)   │
//! └──────────────────────────────────────────────┘
//!          │ spawn per group
//!          ▼
//!   CandidateProcessor ──outcome──► mpsc ──► Aggregator (owns PipelineSummary)
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::candidate_processor::CandidateProcessor;
use crate::domain::models::{
    CandidateFile, Config, CoverageReport, FileOutcome, OutcomeStatus, PipelineSummary, RunStatus,
};
use crate::domain::ports::CompletionClient;
use crate::domain::{PipelineError, PipelineResult};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::coverage::CoverageIngester;
use crate::infrastructure::inference::ModelClient;
use crate::infrastructure::lock::RunLock;
use crate::services::test_merger::read_artifact;
use crate::services::FileSelector;

/// Summary artifact file name inside the output directory
pub const SUMMARY_FILE_NAME: &str = "summary.json";

/// Concatenated patch file name inside the output directory
pub const PATCH_FILE_NAME: &str = "changes.patch";

const CANCELLED_BEFORE_START: &str = "cancelled before start";

/// Progress notifications for interactive front ends
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Candidates were selected and dispatching begins
    Started {
        /// Number of candidates
        total: usize,
    },
    /// One candidate reached a terminal state
    CandidateFinished {
        /// Candidate path
        path: String,
        /// Terminal outcome
        status: OutcomeStatus,
        /// Tests merged for the candidate
        tests_added: usize,
    },
}

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Summary of the run
    pub summary: PipelineSummary,
    /// Where the summary was written
    pub summary_path: PathBuf,
    /// Combined patch, when any artifact changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_path: Option<PathBuf>,
}

/// Candidates that share one test artifact, in rank order
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactGroup {
    /// Repository-relative artifact path
    pub test_file: String,
    /// Candidates targeting the artifact
    pub candidates: Vec<CandidateFile>,
}

/// Runs the pipeline over a coverage report
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    processor: CandidateProcessor,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl PipelineOrchestrator {
    /// Create an orchestrator using `client` for model calls
    pub fn new(config: Arc<Config>, client: Arc<dyn CompletionClient>) -> Self {
        let model = ModelClient::from_config(client, &config);
        let processor = CandidateProcessor::new(Arc::clone(&config), model);
        Self {
            config,
            processor,
            progress: None,
        }
    }

    /// Report progress on `tx` while the run is in flight
    #[must_use]
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Rank candidates without processing them
    pub fn select(&self, report: &CoverageReport) -> PipelineResult<Vec<CandidateFile>> {
        ConfigLoader::validate(&self.config)?;
        let selector = FileSelector::from_config(&self.config)?;
        Ok(selector.select(report))
    }

    /// Ingest the coverage report at `coverage_path` and run the pipeline
    pub async fn run(&self, coverage_path: &Path, cancel: CancellationToken) -> PipelineResult<RunReport> {
        ConfigLoader::validate(&self.config)?;
        let report = CoverageIngester::load(coverage_path)?;
        info!(path = %coverage_path.display(), files = report.len(), "Loaded coverage report");
        self.run_report(&report, cancel).await
    }

    /// Run the pipeline over an already ingested report.
    ///
    /// Returns an error only for fatal conditions. Per-candidate failures are
    /// recorded in the summary.
    #[instrument(skip(self, report, cancel), fields(files = report.len()))]
    pub async fn run_report(&self, report: &CoverageReport, cancel: CancellationToken) -> PipelineResult<RunReport> {
        let candidates = self.select(report)?;
        let mut summary = PipelineSummary::new(self.config.model.id.clone());

        if candidates.is_empty() {
            info!("No file below the coverage target");
            summary.finish(RunStatus::NothingToDo);
            return self.write_artifacts(summary).await;
        }

        let _lock = if self.config.apply {
            Some(RunLock::acquire(&self.config.repo_root)?)
        } else {
            None
        };

        info!(
            candidates = candidates.len(),
            apply = self.config.apply,
            concurrency = self.config.concurrency,
            "Starting generation run"
        );
        self.notify(ProgressEvent::Started {
            total: candidates.len(),
        });

        let run_token = cancel.child_token();
        let timeout_guard = self.config.run_timeout_secs.map(|secs| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(secs)) => {
                        warn!(timeout_secs = secs, "Run timeout reached, cancelling");
                        token.cancel();
                    }
                    () = token.cancelled() => {}
                }
            })
        });

        let groups = group_by_artifact(&self.processor, candidates);
        let (tx, rx) = mpsc::channel::<FileOutcome>(64);
        let aggregator = tokio::spawn(aggregate(rx, summary, self.progress.clone()));

        self.dispatch(groups, tx, &run_token).await;

        let mut summary = aggregator.await.map_err(|e| {
            PipelineError::io(&self.config.output_dir, std::io::Error::other(format!("aggregator failed: {e}")))
        })?;

        if let Some(handle) = timeout_guard {
            handle.abort();
        }

        let status = if run_token.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        summary.finish(status);
        info!(
            status = %summary.status,
            files_processed = summary.files_processed,
            tests_generated = summary.tests_generated,
            merged = summary.merged_count(),
            "Generation run finished"
        );

        self.write_artifacts(summary).await
    }

    /// Hand groups to workers until all are dispatched or the run is cancelled
    async fn dispatch(&self, groups: Vec<ArtifactGroup>, tx: mpsc::Sender<FileOutcome>, run_token: &CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers = JoinSet::new();
        let mut pending = groups.into_iter();

        for group in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                () = run_token.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                send_unstarted(&tx, group.candidates).await;
                break;
            };

            let processor = self.processor.clone();
            let tx = tx.clone();
            let token = run_token.clone();
            workers.spawn(async move {
                process_group(processor, group, tx, token).await;
                drop(permit);
            });
        }

        let remaining: Vec<CandidateFile> = pending.flat_map(|g| g.candidates).collect();
        if !remaining.is_empty() {
            info!(count = remaining.len(), "Cancelled before dispatch");
            send_unstarted(&tx, remaining).await;
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
    }

    async fn write_artifacts(&self, summary: PipelineSummary) -> PipelineResult<RunReport> {
        let dir = &self.config.output_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::io(dir, e))?;

        let summary_path = dir.join(SUMMARY_FILE_NAME);
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| PipelineError::io(&summary_path, std::io::Error::other(e)))?;
        tokio::fs::write(&summary_path, json)
            .await
            .map_err(|e| PipelineError::io(&summary_path, e))?;

        let patches: Vec<&str> = summary
            .details
            .iter()
            .filter_map(|d| d.patch.as_deref())
            .collect();
        let patch_path = if patches.is_empty() {
            None
        } else {
            let path = dir.join(PATCH_FILE_NAME);
            tokio::fs::write(&path, patches.concat())
                .await
                .map_err(|e| PipelineError::io(&path, e))?;
            Some(path)
        };

        debug!(path = %summary_path.display(), "Wrote summary");
        Ok(RunReport {
            summary,
            summary_path,
            patch_path,
        })
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

/// Group candidates by target artifact, ordered by best-ranked member
pub fn group_by_artifact(processor: &CandidateProcessor, candidates: Vec<CandidateFile>) -> Vec<ArtifactGroup> {
    let mut groups: Vec<ArtifactGroup> = Vec::new();
    for candidate in candidates {
        let test_file = processor.locator().locate(&candidate.path, candidate.language);
        match groups.iter_mut().find(|g| g.test_file == test_file) {
            Some(group) => group.candidates.push(candidate),
            None => groups.push(ArtifactGroup {
                test_file,
                candidates: vec![candidate],
            }),
        }
    }
    groups
}

async fn process_group(
    processor: CandidateProcessor,
    group: ArtifactGroup,
    tx: mpsc::Sender<FileOutcome>,
    token: CancellationToken,
) {
    let artifact_path = processor.locator().resolve(&group.test_file);
    let mut artifact = match read_artifact(&artifact_path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(test_file = %group.test_file, error = %e, "Test artifact unreadable");
            for candidate in group.candidates {
                let mut outcome = FileOutcome::skipped(&candidate.path, candidate.coverage_pct, e.to_string());
                outcome.test_file = Some(group.test_file.clone());
                let _ = tx.send(outcome).await;
            }
            return;
        }
    };

    let mut candidates = group.candidates.into_iter();
    let mut unstarted = Vec::new();
    for candidate in candidates.by_ref() {
        if token.is_cancelled() {
            unstarted.push(candidate);
            break;
        }
        let outcome = processor
            .process(candidate, &group.test_file, &mut artifact, &token)
            .await;
        if tx.send(outcome).await.is_err() {
            return;
        }
    }
    unstarted.extend(candidates);
    send_unstarted(&tx, unstarted).await;
}

async fn send_unstarted(tx: &mpsc::Sender<FileOutcome>, candidates: Vec<CandidateFile>) {
    for candidate in candidates {
        let mut outcome = FileOutcome::skipped(&candidate.path, candidate.coverage_pct, CANCELLED_BEFORE_START);
        outcome.dispatched = false;
        let _ = tx.send(outcome).await;
    }
}

/// Sole owner of the summary while workers run
async fn aggregate(
    mut rx: mpsc::Receiver<FileOutcome>,
    mut summary: PipelineSummary,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
) -> PipelineSummary {
    while let Some(outcome) = rx.recv().await {
        debug!(path = %outcome.path, status = %outcome.status, "Candidate finished");
        if let Some(tx) = &progress {
            let _ = tx.send(ProgressEvent::CandidateFinished {
                path: outcome.path.clone(),
                status: outcome.status,
                tests_added: outcome.tests_added,
            });
        }
        summary.record(outcome);
    }
    summary
}
