//! Per-candidate generation artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::candidate::CandidateFile;
use super::coverage::Language;
use super::structure::CodeStructure;

/// Test frameworks the prompt and validator know how to target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestFramework {
    /// pytest
    Pytest,
    /// unittest
    Unittest,
    /// Jest
    Jest,
    /// Vitest
    Vitest,
    /// Mocha
    Mocha,
    /// JUnit
    Junit,
    /// NUnit
    Nunit,
    /// xUnit
    Xunit,
    /// Go `testing` package
    GoTesting,
    /// Rust `#[test]` functions
    RustBuiltin,
    /// RSpec
    Rspec,
    /// Minitest
    Minitest,
    /// PHPUnit
    Phpunit,
    /// GoogleTest
    Gtest,
    /// Framework-neutral tests
    Generic,
}

impl TestFramework {
    /// Configuration name of the framework
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Unittest => "unittest",
            Self::Jest => "jest",
            Self::Vitest => "vitest",
            Self::Mocha => "mocha",
            Self::Junit => "junit",
            Self::Nunit => "nunit",
            Self::Xunit => "xunit",
            Self::GoTesting => "go-testing",
            Self::RustBuiltin => "rust-builtin",
            Self::Rspec => "rspec",
            Self::Minitest => "minitest",
            Self::Phpunit => "phpunit",
            Self::Gtest => "gtest",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for TestFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestFramework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pytest" => Ok(Self::Pytest),
            "unittest" => Ok(Self::Unittest),
            "jest" => Ok(Self::Jest),
            "vitest" => Ok(Self::Vitest),
            "mocha" => Ok(Self::Mocha),
            "junit" => Ok(Self::Junit),
            "nunit" => Ok(Self::Nunit),
            "xunit" => Ok(Self::Xunit),
            "go-testing" | "testing" | "go" => Ok(Self::GoTesting),
            "rust-builtin" | "builtin" | "cargo" => Ok(Self::RustBuiltin),
            "rspec" => Ok(Self::Rspec),
            "minitest" => Ok(Self::Minitest),
            "phpunit" => Ok(Self::Phpunit),
            "gtest" | "googletest" => Ok(Self::Gtest),
            "generic" | "default" => Ok(Self::Generic),
            other => Err(format!("unknown test framework: {other}")),
        }
    }
}

/// Everything the prompt needs for one candidate. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The selected file
    pub candidate: CandidateFile,
    /// Repository-relative path of the test artifact that will receive the code
    pub test_file: String,
    /// Source text, possibly truncated
    pub source: String,
    /// Extracted structure
    pub structure: CodeStructure,
    /// Framework the tests must use
    pub framework: TestFramework,
    /// Source language
    pub language: Language,
    /// Test names already present in the target artifact
    pub existing_tests: BTreeSet<String>,
}

/// Outcome of validating a model response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Parseable test code with at least one test
    Valid,
    /// Code the parser rejects
    SyntaxError,
    /// No test code in the response
    Empty,
    /// The model call produced no text
    ModelFailure,
}

impl ValidationStatus {
    /// Snake-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::SyntaxError => "syntax_error",
            Self::Empty => "empty",
            Self::ModelFailure => "model_failure",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model output for one candidate, finalized by the validator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// The selected file
    pub candidate: CandidateFile,
    /// Unmodified model output
    pub raw_model_text: String,
    /// Present only when `validation_status` is `Valid`
    pub extracted_code: Option<String>,
    /// Validation outcome
    pub validation_status: ValidationStatus,
    /// Names of the tests in the extracted code
    pub test_names: BTreeSet<String>,
}

impl GenerationResult {
    /// A result for a candidate whose model call never produced text
    pub fn model_failure(candidate: CandidateFile) -> Self {
        Self {
            candidate,
            raw_model_text: String::new(),
            extracted_code: None,
            validation_status: ValidationStatus::ModelFailure,
            test_names: BTreeSet::new(),
        }
    }

    /// Whether the code may be merged
    pub fn is_valid(&self) -> bool {
        self.validation_status == ValidationStatus::Valid && self.extracted_code.is_some()
    }
}
