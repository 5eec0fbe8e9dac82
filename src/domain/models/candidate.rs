//! Files selected for generation.

use serde::{Deserialize, Serialize};

use super::coverage::Language;

/// A file selected for test generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Path as reported by the coverage source
    pub path: String,

    /// Measured coverage before generation, `[0, 100)`
    pub coverage_pct: f64,

    /// Source language
    pub language: Language,

    /// 1-based position in the ranked candidate list
    pub rank: usize,
}
