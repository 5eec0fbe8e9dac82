//! Normalized per-file coverage data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Source language of a file under analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python
    Python,
    /// JavaScript
    JavaScript,
    /// TypeScript
    TypeScript,
    /// Java
    Java,
    /// C#
    CSharp,
    /// C++
    Cpp,
    /// C
    C,
    /// Go
    Go,
    /// Rust
    Rust,
    /// Ruby
    Ruby,
    /// PHP
    Php,
    /// Unrecognized extension
    Unknown,
}

impl Language {
    /// All concrete languages, in a stable order
    pub const ALL: [Self; 11] = [
        Self::Python,
        Self::JavaScript,
        Self::TypeScript,
        Self::Java,
        Self::CSharp,
        Self::Cpp,
        Self::C,
        Self::Go,
        Self::Rust,
        Self::Ruby,
        Self::Php,
    ];

    /// Detect the language from a file extension
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("py") => Self::Python,
            Some("js" | "jsx" | "mjs" | "cjs") => Self::JavaScript,
            Some("ts" | "tsx") => Self::TypeScript,
            Some("java") => Self::Java,
            Some("cs") => Self::CSharp,
            Some("cpp" | "cc" | "cxx" | "c++" | "hpp") => Self::Cpp,
            Some("c" | "h") => Self::C,
            Some("go") => Self::Go,
            Some("rs") => Self::Rust,
            Some("rb") => Self::Ruby,
            Some("php") => Self::Php,
            _ => Self::Unknown,
        }
    }

    /// Canonical lowercase name, also used as the code fence tag
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::CSharp => "csharp",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Unknown => "unknown",
        }
    }

    /// Fence tags a model may use for this language
    pub const fn fence_aliases(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["python", "py", "python3"],
            Self::JavaScript => &["javascript", "js", "jsx", "node"],
            Self::TypeScript => &["typescript", "ts", "tsx"],
            Self::Java => &["java"],
            Self::CSharp => &["csharp", "cs", "c#"],
            Self::Cpp => &["cpp", "c++", "cc", "cxx"],
            Self::C => &["c", "h"],
            Self::Go => &["go", "golang"],
            Self::Rust => &["rust", "rs"],
            Self::Ruby => &["ruby", "rb"],
            Self::Php => &["php"],
            Self::Unknown => &[],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            "java" => Ok(Self::Java),
            "csharp" | "c#" | "cs" => Ok(Self::CSharp),
            "cpp" | "c++" => Ok(Self::Cpp),
            "c" => Ok(Self::C),
            "go" | "golang" => Ok(Self::Go),
            "rust" | "rs" => Ok(Self::Rust),
            "ruby" | "rb" => Ok(Self::Ruby),
            "php" => Ok(Self::Php),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Coverage figures for a single file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Statements instrumented
    pub statements_total: u64,
    /// Statements executed
    pub statements_covered: u64,
    /// Percentage in `[0, 100]`
    pub coverage_pct: f64,
    /// Language inferred from the path
    pub language: Language,
}

impl FileCoverage {
    /// Build from statement counts.
    ///
    /// A file with no statements is reported fully covered so it is never
    /// selected for generation.
    pub fn from_counts(statements_covered: u64, statements_total: u64, language: Language) -> Self {
        let coverage_pct = if statements_total == 0 {
            100.0
        } else {
            100.0 * statements_covered as f64 / statements_total as f64
        };

        Self {
            statements_total,
            statements_covered,
            coverage_pct,
            language,
        }
    }

    /// Build from a percentage alone; counts are unknown and recorded as zero
    pub fn from_percentage(coverage_pct: f64, language: Language) -> Self {
        Self {
            statements_total: 0,
            statements_covered: 0,
            coverage_pct,
            language,
        }
    }
}

/// Immutable per-run mapping from file path to coverage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    files: BTreeMap<String, FileCoverage>,
}

impl CoverageReport {
    /// Wrap per-file figures keyed by path
    pub fn new(files: BTreeMap<String, FileCoverage>) -> Self {
        Self { files }
    }

    /// Figures for `path`
    pub fn get(&self, path: &str) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    /// Iterate files in lexical path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileCoverage)> {
        self.files.iter().map(|(path, cov)| (path.as_str(), cov))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file was reported
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(String, FileCoverage)> for CoverageReport {
    fn from_iter<I: IntoIterator<Item = (String, FileCoverage)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("src/app.py"), Language::Python);
        assert_eq!(Language::from_path("web/App.TSX"), Language::TypeScript);
        assert_eq!(Language::from_path("lib/index.mjs"), Language::JavaScript);
        assert_eq!(Language::from_path("core/engine.cc"), Language::Cpp);
        assert_eq!(Language::from_path("README.md"), Language::Unknown);
        assert_eq!(Language::from_path("Makefile"), Language::Unknown);
    }

    #[test]
    fn test_language_aliases_parse() {
        assert_eq!("JS".parse::<Language>(), Ok(Language::JavaScript));
        assert_eq!("golang".parse::<Language>(), Ok(Language::Go));
        assert_eq!("c#".parse::<Language>(), Ok(Language::CSharp));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_coverage_from_counts() {
        let cov = FileCoverage::from_counts(25, 100, Language::Python);
        assert!((cov.coverage_pct - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_statements_is_fully_covered() {
        let cov = FileCoverage::from_counts(0, 0, Language::Python);
        assert!((cov.coverage_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_iterates_in_path_order() {
        let report: CoverageReport = [
            ("b.py".to_string(), FileCoverage::from_counts(1, 2, Language::Python)),
            ("a.py".to_string(), FileCoverage::from_counts(1, 2, Language::Python)),
        ]
        .into_iter()
        .collect();

        let paths: Vec<&str> = report.iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
        assert_eq!(report.len(), 2);
    }
}
