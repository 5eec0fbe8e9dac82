//! Normalization of raw coverage JSON into a `CoverageReport`.
//!
//! Accepted shapes, detected in this order:
//! 1. coverage.py JSON report (`files` object with `summary` entries)
//! 2. Codecov file listing (`files` array with `totals`)
//! 3. A prior selection listing (`least_covered_files`)
//! 4. Canonical mapping of path to `statements` or `coverage_pct`

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::models::{CoverageReport, FileCoverage, Language};
use crate::domain::PipelineError;

/// Coverage parsing errors
#[derive(Error, Debug)]
pub enum IngestError {
    /// The coverage file could not be read
    #[error("Failed to read coverage data from {path}: {source}")]
    Read {
        /// File that failed to read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The input is not JSON
    #[error("Coverage data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON that matches no known coverage layout
    #[error("Unrecognized coverage schema: {0}")]
    UnrecognizedSchema(String),

    /// A file entry with missing or inconsistent counts
    #[error("Invalid coverage entry for {path}: {reason}")]
    InvalidEntry {
        /// Path of the entry
        path: String,
        /// What is wrong with it
        reason: String,
    },
}

impl From<IngestError> for PipelineError {
    fn from(err: IngestError) -> Self {
        Self::IngestionFailure(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CoveragePyReport {
    files: BTreeMap<String, CoveragePyFile>,
}

#[derive(Debug, Deserialize)]
struct CoveragePyFile {
    summary: CoveragePySummary,
}

#[derive(Debug, Deserialize)]
struct CoveragePySummary {
    covered_lines: Option<u64>,
    num_statements: Option<u64>,
    percent_covered: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CodecovListing {
    files: Vec<CodecovFile>,
}

#[derive(Debug, Deserialize)]
struct CodecovFile {
    name: String,
    #[serde(default)]
    totals: CodecovTotals,
}

#[derive(Debug, Default, Deserialize)]
struct CodecovTotals {
    coverage: Option<f64>,
    lines: Option<u64>,
    hits: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SelectionListing {
    least_covered_files: Vec<SelectionEntry>,
}

#[derive(Debug, Deserialize)]
struct SelectionEntry {
    filename: String,
    coverage: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CanonicalEntry {
    statements: Option<StatementCounts>,
    #[serde(alias = "percent_covered", alias = "percentage")]
    coverage_pct: Option<f64>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementCounts {
    covered: u64,
    total: u64,
}

/// Coverage report parser
pub struct CoverageIngester;

impl CoverageIngester {
    /// Read and normalize a coverage file
    pub fn load(path: impl AsRef<Path>) -> Result<CoverageReport, IngestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| IngestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let report = Self::parse(&raw)?;
        info!(path = %path.display(), files = report.len(), "Loaded coverage report");
        Ok(report)
    }

    /// Normalize raw coverage JSON
    pub fn parse(raw: &str) -> Result<CoverageReport, IngestError> {
        let value: Value = serde_json::from_str(raw)?;

        let Value::Object(map) = &value else {
            return Err(IngestError::UnrecognizedSchema(
                "top-level value must be an object".to_string(),
            ));
        };

        match map.get("files") {
            Some(Value::Object(_)) => {
                debug!("Detected coverage.py report");
                let report: CoveragePyReport = serde_json::from_value(value)?;
                return Self::from_coverage_py(report);
            }
            Some(Value::Array(_)) => {
                debug!("Detected Codecov file listing");
                let listing: CodecovListing = serde_json::from_value(value)?;
                return Self::from_codecov(listing);
            }
            Some(_) => {
                return Err(IngestError::UnrecognizedSchema(
                    "`files` must be an object or an array".to_string(),
                ));
            }
            None => {}
        }

        if map.contains_key("least_covered_files") {
            debug!("Detected selection listing");
            let listing: SelectionListing = serde_json::from_value(value)?;
            return Self::from_selection(listing);
        }

        debug!("Treating coverage data as canonical path mapping");
        let entries: BTreeMap<String, CanonicalEntry> = serde_json::from_value(value)
            .map_err(|e| IngestError::UnrecognizedSchema(e.to_string()))?;
        Self::from_canonical(entries)
    }

    fn from_coverage_py(report: CoveragePyReport) -> Result<CoverageReport, IngestError> {
        report
            .files
            .into_iter()
            .map(|(path, file)| {
                let language = Language::from_path(&path);
                let summary = file.summary;
                let coverage = match (summary.covered_lines, summary.num_statements) {
                    (Some(covered), Some(total)) => counts(&path, covered, total, language)?,
                    _ => match summary.percent_covered {
                        Some(pct) => percentage(&path, pct, language)?,
                        None => return Err(missing_figures(&path)),
                    },
                };
                Ok((path, coverage))
            })
            .collect()
    }

    fn from_codecov(listing: CodecovListing) -> Result<CoverageReport, IngestError> {
        listing
            .files
            .into_iter()
            .map(|file| {
                let path = file.name;
                let language = Language::from_path(&path);
                let totals = file.totals;
                let coverage = match (totals.coverage, totals.hits, totals.lines) {
                    (Some(pct), hits, lines) => {
                        let mut cov = percentage(&path, pct, language)?;
                        if let (Some(hits), Some(lines)) = (hits, lines) {
                            cov.statements_covered = hits;
                            cov.statements_total = lines;
                        }
                        cov
                    }
                    (None, Some(hits), Some(lines)) => counts(&path, hits, lines, language)?,
                    _ => FileCoverage::from_percentage(0.0, language),
                };
                Ok((path, coverage))
            })
            .collect()
    }

    fn from_selection(listing: SelectionListing) -> Result<CoverageReport, IngestError> {
        listing
            .least_covered_files
            .into_iter()
            .map(|entry| {
                let language = Language::from_path(&entry.filename);
                let coverage = percentage(&entry.filename, entry.coverage, language)?;
                Ok((entry.filename, coverage))
            })
            .collect()
    }

    fn from_canonical(entries: BTreeMap<String, CanonicalEntry>) -> Result<CoverageReport, IngestError> {
        entries
            .into_iter()
            .map(|(path, entry)| {
                let language = match entry.language.as_deref() {
                    Some(name) => name.parse().map_err(|reason| IngestError::InvalidEntry {
                        path: path.clone(),
                        reason,
                    })?,
                    None => Language::from_path(&path),
                };
                let coverage = match (entry.statements, entry.coverage_pct) {
                    (Some(s), _) => counts(&path, s.covered, s.total, language)?,
                    (None, Some(pct)) => percentage(&path, pct, language)?,
                    (None, None) => return Err(missing_figures(&path)),
                };
                Ok((path, coverage))
            })
            .collect()
    }
}

fn counts(path: &str, covered: u64, total: u64, language: Language) -> Result<FileCoverage, IngestError> {
    if covered > total {
        return Err(IngestError::InvalidEntry {
            path: path.to_string(),
            reason: format!("covered statements ({covered}) exceed total ({total})"),
        });
    }
    Ok(FileCoverage::from_counts(covered, total, language))
}

fn percentage(path: &str, pct: f64, language: Language) -> Result<FileCoverage, IngestError> {
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(IngestError::InvalidEntry {
            path: path.to_string(),
            reason: format!("coverage percentage {pct} outside [0, 100]"),
        });
    }
    Ok(FileCoverage::from_percentage(pct, language))
}

fn missing_figures(path: &str) -> IngestError {
    IngestError::InvalidEntry {
        path: path.to_string(),
        reason: "neither statement counts nor a percentage present".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(report: &CoverageReport, path: &str) -> f64 {
        report.get(path).expect("path present").coverage_pct
    }

    #[test]
    fn test_parse_canonical_statements() {
        let raw = r#"{
            "src/a.py": {"statements": {"covered": 1, "total": 10}},
            "src/b.ts": {"statements": {"covered": 0, "total": 0}}
        }"#;

        let report = CoverageIngester::parse(raw).unwrap();
        assert_eq!(report.len(), 2);
        assert!((pct(&report, "src/a.py") - 10.0).abs() < 1e-9);
        assert!((pct(&report, "src/b.ts") - 100.0).abs() < 1e-9);
        assert_eq!(report.get("src/b.ts").unwrap().language, Language::TypeScript);
    }

    #[test]
    fn test_parse_canonical_percentage_with_language() {
        let raw = r#"{"lib/tool": {"coverage_pct": 42.5, "language": "ruby"}}"#;
        let report = CoverageIngester::parse(raw).unwrap();
        let cov = report.get("lib/tool").unwrap();
        assert_eq!(cov.language, Language::Ruby);
        assert!((cov.coverage_pct - 42.5).abs() < 1e-9);
        assert_eq!(cov.statements_total, 0);
    }

    #[test]
    fn test_parse_coverage_py_report() {
        let raw = r#"{
            "meta": {"version": "7.4.0"},
            "files": {
                "sample_app/calculator.py": {
                    "summary": {"covered_lines": 12, "num_statements": 48, "percent_covered": 25.0}
                }
            },
            "totals": {"percent_covered": 25.0}
        }"#;

        let report = CoverageIngester::parse(raw).unwrap();
        let cov = report.get("sample_app/calculator.py").unwrap();
        assert_eq!(cov.statements_covered, 12);
        assert_eq!(cov.statements_total, 48);
        assert!((cov.coverage_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_codecov_listing_prefers_reported_coverage() {
        let raw = r#"{"files": [
            {"name": "api/handler.go", "totals": {"coverage": 61.0, "lines": 100, "hits": 60}},
            {"name": "api/util.go", "totals": {"lines": 20, "hits": 5}}
        ]}"#;

        let report = CoverageIngester::parse(raw).unwrap();
        assert!((pct(&report, "api/handler.go") - 61.0).abs() < 1e-9);
        assert_eq!(report.get("api/handler.go").unwrap().statements_total, 100);
        assert!((pct(&report, "api/util.go") - 25.0).abs() < 1e-9);
        assert_eq!(report.get("api/util.go").unwrap().language, Language::Go);
    }

    #[test]
    fn test_parse_selection_listing() {
        let raw = r#"{"repository": "org/repo", "least_covered_files": [
            {"filename": "app/models.py", "coverage": 12.0}
        ]}"#;

        let report = CoverageIngester::parse(raw).unwrap();
        assert!((pct(&report, "app/models.py") - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_object_is_empty_report() {
        let report = CoverageIngester::parse("{}").unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_reject_non_object() {
        let err = CoverageIngester::parse("[1, 2]").unwrap_err();
        assert!(matches!(err, IngestError::UnrecognizedSchema(_)));
    }

    #[test]
    fn test_reject_invalid_json() {
        let err = CoverageIngester::parse("{not json").unwrap_err();
        assert!(matches!(err, IngestError::Json(_)));
    }

    #[test]
    fn test_reject_schema_mismatch() {
        let err = CoverageIngester::parse(r#"{"a.py": {"lines": 3}}"#).unwrap_err();
        assert!(matches!(err, IngestError::UnrecognizedSchema(_)));
    }

    #[test]
    fn test_reject_covered_exceeding_total() {
        let err = CoverageIngester::parse(r#"{"a.py": {"statements": {"covered": 5, "total": 2}}}"#)
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidEntry { .. }));
    }

    #[test]
    fn test_reject_out_of_range_percentage() {
        let err = CoverageIngester::parse(r#"{"a.py": {"coverage_pct": 140.0}}"#).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEntry { .. }));
    }

    #[test]
    fn test_ingest_error_maps_to_fatal_pipeline_error() {
        let err: PipelineError = CoverageIngester::parse("nope").unwrap_err().into();
        assert!(err.is_fatal());
        assert!(matches!(err, PipelineError::IngestionFailure(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CoverageIngester::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, IngestError::Read { .. }));
    }
}
