//! `covgen select`

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::display::{colorize_coverage, list_table, output, render_list, CommandOutput};
use crate::cli::types::SelectArgs;
use crate::domain::models::{CandidateFile, Config};
use crate::infrastructure::coverage::CoverageIngester;
use crate::services::{FileSelector, TestLocator};

/// A ranked candidate and where its tests would go
#[derive(Debug, Serialize)]
pub struct SelectedCandidate {
    /// The candidate
    #[serde(flatten)]
    pub candidate: CandidateFile,
    /// Target test artifact
    pub test_file: String,
}

/// JSON output of `covgen select`
#[derive(Debug, Serialize)]
pub struct SelectOutput {
    /// Threshold in effect
    pub target_coverage: f64,
    /// Candidates in rank order
    pub candidates: Vec<SelectedCandidate>,
}

impl CommandOutput for SelectOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["rank", "path", "language", "coverage", "test file"]);
        for selected in &self.candidates {
            let c = &selected.candidate;
            table.add_row(vec![
                c.rank.to_string(),
                c.path.clone(),
                c.language.to_string(),
                colorize_coverage(c.coverage_pct, self.target_coverage).to_string(),
                selected.test_file.clone(),
            ]);
        }
        render_list("candidate", table, self.candidates.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Handle the select command
pub fn execute(args: &SelectArgs, config: &Config, json: bool) -> Result<()> {
    let report = CoverageIngester::load(&args.coverage)
        .with_context(|| format!("Failed to ingest {}", args.coverage.display()))?;
    let selector = FileSelector::from_config(config)?;
    let locator = TestLocator::new(config.repo_root.clone());

    let candidates = selector
        .select(&report)
        .into_iter()
        .map(|candidate| SelectedCandidate {
            test_file: locator.locate(&candidate.path, candidate.language),
            candidate,
        })
        .collect();

    output(
        &SelectOutput {
            target_coverage: config.target_coverage,
            candidates,
        },
        json,
    );
    Ok(())
}
