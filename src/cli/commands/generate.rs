//! `covgen generate`

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::application::{PipelineOrchestrator, RunReport};
use crate::cli::display::{colorize_coverage, colorize_status, list_table, output, truncate_ellipsis, CommandOutput};
use crate::cli::output::drive_progress;
use crate::cli::types::GenerateArgs;
use crate::domain::models::{Config, OutcomeStatus};
use crate::infrastructure::inference::ModelsHttpClient;

/// JSON output of `covgen generate`
#[derive(Debug, Serialize)]
pub struct GenerateOutput {
    /// Run report
    #[serde(flatten)]
    pub report: RunReport,
    /// Threshold in effect
    #[serde(skip)]
    pub target_coverage: f64,
}

impl CommandOutput for GenerateOutput {
    fn to_human(&self) -> String {
        let summary = &self.report.summary;
        let mut table = list_table(&["path", "coverage", "status", "tests", "detail"]);
        for detail in &summary.details {
            let note = match detail.status {
                OutcomeStatus::Merged => detail.test_file.clone().unwrap_or_default(),
                OutcomeStatus::Skipped => detail.reason.clone().unwrap_or_default(),
            };
            table.add_row(vec![
                detail.path.clone(),
                colorize_coverage(detail.coverage_before, self.target_coverage).to_string(),
                colorize_status(&detail.status.to_string()).to_string(),
                detail.tests_added.to_string(),
                truncate_ellipsis(&note, 60),
            ]);
        }

        let mut lines = vec![format!(
            "Run {}: {} file(s) processed, {} test(s) generated",
            colorize_status(&summary.status.to_string()),
            summary.files_processed,
            summary.tests_generated
        )];
        if !summary.details.is_empty() {
            lines.push(table.to_string());
        }
        lines.push(format!("Summary: {}", self.report.summary_path.display()));
        if let Some(patch) = &self.report.patch_path {
            lines.push(format!("Patch:   {}", patch.display()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Handle the generate command
pub async fn execute(args: GenerateArgs, config: Config, json: bool) -> Result<()> {
    let client = ModelsHttpClient::from_config(&config.model).context("Failed to create model client")?;
    let target_coverage = config.target_coverage;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight files");
            signal_token.cancel();
        }
    });

    let mut orchestrator = PipelineOrchestrator::new(Arc::new(config), Arc::new(client));
    let progress = if json {
        None
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        orchestrator = orchestrator.with_progress(tx);
        Some(tokio::spawn(drive_progress(rx)))
    };

    let result = orchestrator.run(&args.coverage, cancel).await;
    drop(orchestrator);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    let report = result.context("Generation run failed")?;

    output(
        &GenerateOutput {
            report,
            target_coverage,
        },
        json,
    );
    Ok(())
}
