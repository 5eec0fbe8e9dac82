//! Mapping from source files to the test artifact that receives their tests.

use std::path::{Path, PathBuf};

use crate::domain::models::Language;

/// Resolves test artifact paths relative to the repository root
#[derive(Debug, Clone)]
pub struct TestLocator {
    repo_root: PathBuf,
}

impl TestLocator {
    /// Create a locator for the repository at `repo_root`
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Conventional test paths for `source_path`, most preferred first
    pub fn candidates(source_path: &str, language: Language) -> Vec<String> {
        let path = Path::new(source_path.strip_prefix("./").unwrap_or(source_path));
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let in_dir = |name: &str| {
            if dir.is_empty() {
                name.to_string()
            } else {
                format!("{dir}/{name}")
            }
        };

        match language {
            Language::Python => vec![
                format!("tests/test_{stem}.py"),
                in_dir(&format!("test_{stem}.py")),
                in_dir(&format!("tests/test_{stem}.py")),
            ],
            Language::JavaScript | Language::TypeScript => vec![
                in_dir(&format!("__tests__/{stem}.test.{ext}")),
                in_dir(&format!("{stem}.test.{ext}")),
                format!("tests/{stem}.test.{ext}"),
            ],
            Language::Java => vec![
                format!("src/test/java/{stem}Test.java"),
                in_dir(&format!("{stem}Test.java")),
            ],
            Language::Go => vec![in_dir(&format!("{stem}_test.go"))],
            Language::Rust => vec![format!("tests/{stem}_test.rs")],
            Language::Ruby => vec![format!("spec/{stem}_spec.rb")],
            _ => vec![format!("tests/test_{file_name}")],
        }
    }

    /// First candidate that exists under the root, else the first candidate
    pub fn locate(&self, source_path: &str, language: Language) -> String {
        let candidates = Self::candidates(source_path, language);
        candidates
            .iter()
            .find(|c| self.repo_root.join(c).is_file())
            .or_else(|| candidates.first())
            .cloned()
            .unwrap_or_else(|| format!("tests/test_{source_path}"))
    }

    /// Absolute (root-joined) location of a repository-relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.repo_root.join(relative)
    }
}
