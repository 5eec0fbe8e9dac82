//! Test framework resolution per language.

use crate::domain::models::{Language, TestFramework};

/// Default framework for a language when nothing more specific is known
pub const fn default_framework(language: Language) -> TestFramework {
    match language {
        Language::Python => TestFramework::Pytest,
        Language::JavaScript | Language::TypeScript => TestFramework::Jest,
        Language::Java => TestFramework::Junit,
        Language::CSharp => TestFramework::Nunit,
        Language::Go => TestFramework::GoTesting,
        Language::Rust => TestFramework::RustBuiltin,
        Language::Ruby => TestFramework::Rspec,
        Language::Php => TestFramework::Phpunit,
        Language::Cpp | Language::C => TestFramework::Gtest,
        Language::Unknown => TestFramework::Generic,
    }
}

/// Classify the framework from the language and the existing test artifact.
///
/// Content signatures refine the language default: a file that already uses
/// `unittest`, `vitest`, `mocha`, `xunit` or `Minitest` keeps using it.
pub fn detect_framework(language: Language, existing_tests: Option<&str>) -> TestFramework {
    let fallback = default_framework(language);
    let Some(content) = existing_tests else {
        return fallback;
    };

    match language {
        Language::Python => {
            let uses_unittest = content.contains("import unittest")
                || content.contains("from unittest")
                || content.contains("unittest.TestCase");
            if uses_unittest && !content.contains("import pytest") {
                TestFramework::Unittest
            } else {
                fallback
            }
        }
        Language::JavaScript | Language::TypeScript => {
            if content.contains("from 'vitest'") || content.contains("from \"vitest\"") {
                TestFramework::Vitest
            } else if content.contains("require('mocha')")
                || content.contains("from 'mocha'")
                || content.contains("chai")
            {
                TestFramework::Mocha
            } else {
                fallback
            }
        }
        Language::CSharp => {
            if content.contains("using Xunit") || content.contains("[Fact]") || content.contains("[Theory]") {
                TestFramework::Xunit
            } else {
                fallback
            }
        }
        Language::Ruby => {
            if content.contains("Minitest") || content.contains("minitest/autorun") {
                TestFramework::Minitest
            } else {
                fallback
            }
        }
        _ => fallback,
    }
}

/// Apply a configured framework name, with "auto" deferring to detection
pub fn resolve_framework(configured: &str, language: Language, existing_tests: Option<&str>) -> TestFramework {
    if configured.eq_ignore_ascii_case("auto") {
        return detect_framework(language, existing_tests);
    }
    configured
        .parse()
        .unwrap_or_else(|_| detect_framework(language, existing_tests))
}
