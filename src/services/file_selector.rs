//! Candidate ranking over a coverage report.

use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::models::{CandidateFile, Config, CoverageReport, Language};
use crate::domain::{PipelineError, PipelineResult};

/// `*` stays inside one path segment, so `tests/*` matches a single level
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Selects the least covered files worth generating tests for
///
/// Filtering order: language allow-list, exclude patterns, coverage
/// threshold, then an ascending sort by coverage (ties by path) and
/// truncation to `max_files`.
#[derive(Debug, Clone)]
pub struct FileSelector {
    target_coverage: f64,
    max_files: usize,
    exclude_patterns: Vec<Pattern>,
    languages: Option<BTreeSet<Language>>,
}

impl FileSelector {
    /// Create a selector, rejecting invalid thresholds, globs and language names
    pub fn new(
        target_coverage: f64,
        max_files: usize,
        exclude_patterns: &[String],
        languages: &[String],
    ) -> PipelineResult<Self> {
        if max_files == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "max_files must be at least 1".to_string(),
            ));
        }
        if !target_coverage.is_finite() || !(0.0..=100.0).contains(&target_coverage) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "target coverage {target_coverage} outside [0, 100]"
            )));
        }

        let exclude_patterns = exclude_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    PipelineError::InvalidConfiguration(format!("invalid exclude pattern '{p}': {e}"))
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let languages = if languages.is_empty() {
            None
        } else {
            Some(
                languages
                    .iter()
                    .map(|l| l.parse::<Language>().map_err(PipelineError::InvalidConfiguration))
                    .collect::<PipelineResult<BTreeSet<_>>>()?,
            )
        };

        Ok(Self {
            target_coverage,
            max_files,
            exclude_patterns,
            languages,
        })
    }

    /// Create a selector from the selection fields of `config`
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        Self::new(
            config.target_coverage,
            config.max_files,
            &config.exclude_patterns,
            &config.languages,
        )
    }

    /// Whether `path` matches any exclude pattern
    pub fn is_excluded(&self, path: &str) -> bool {
        let normalized = path.strip_prefix("./").unwrap_or(path);
        self.exclude_patterns
            .iter()
            .any(|p| p.matches_with(normalized, MATCH_OPTIONS))
    }

    fn language_allowed(&self, language: Language) -> bool {
        self.languages
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&language))
    }

    /// Rank the report's files. Pure and deterministic.
    pub fn select(&self, report: &CoverageReport) -> Vec<CandidateFile> {
        let mut eligible: Vec<(&str, f64, Language)> = report
            .iter()
            .filter(|(_, cov)| self.language_allowed(cov.language))
            .filter(|(path, _)| !self.is_excluded(path))
            .filter(|(_, cov)| cov.coverage_pct < self.target_coverage)
            .map(|(path, cov)| (path, cov.coverage_pct, cov.language))
            .collect();

        eligible.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        eligible.truncate(self.max_files);

        let candidates: Vec<CandidateFile> = eligible
            .into_iter()
            .enumerate()
            .map(|(i, (path, coverage_pct, language))| CandidateFile {
                path: path.to_string(),
                coverage_pct,
                language,
                rank: i + 1,
            })
            .collect();

        for candidate in &candidates {
            debug!(
                rank = candidate.rank,
                path = %candidate.path,
                coverage = candidate.coverage_pct,
                "Selected candidate"
            );
        }
        info!(
            report_files = report.len(),
            selected = candidates.len(),
            target = self.target_coverage,
            "Candidate selection complete"
        );

        candidates
    }
}
