//! Test case naming conventions per language.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::domain::models::Language;

static PYTHON_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+(test\w*)[ \t]*\(").expect("python test regex should compile")
});

static PYTHON_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^class[ \t]+(Test\w*)").expect("python class regex should compile")
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:public|internal|static|final|abstract|sealed|partial|export|default)[ \t]+)*class[ \t]+(\w+)",
    )
    .expect("class regex should compile")
});

static JS_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:it|test)(?:\.(?:only|skip|concurrent))?\s*\(\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#)
        .expect("js test regex should compile")
});

static JAVA_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@(?:Test|ParameterizedTest|RepeatedTest)\b(?:\([^)]*\))?\s*(?:@\w+(?:\([^)]*\))?\s*)*(?:(?:public|protected|private|static|final)\s+)*void\s+(\w+)\s*\(",
    )
    .expect("java test regex should compile")
});

static CSHARP_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[(?:Test|Fact|Theory|TestMethod|TestCase\b[^\]]*)\]\s*(?:\[[^\]]*\]\s*)*(?:(?:public|private|internal|static)\s+)*(?:async\s+)?(?:void|Task)\s+(\w+)\s*\(",
    )
    .expect("csharp test regex should compile")
});

static GO_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^func\s+(Test\w*)\s*\(\s*\w+\s+\*testing\.T\s*\)").expect("go test regex should compile")
});

static RUST_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\[(?:tokio::)?test(?:\([^)]*\))?\]\s*(?:#\[[^\]]*\]\s*)*(?:pub\s+)?(?:async\s+)?fn\s+(\w+)")
        .expect("rust test regex should compile")
});

static RUBY_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:it\s*\(?\s*(?:'([^']*)'|"([^"]*)")|def\s+(test_\w+))"#)
        .expect("ruby test regex should compile")
});

static PHP_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"function\s+(test\w*)\s*\(").expect("php test regex should compile")
});

static GTEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:TEST|TEST_F|TEST_P)\s*\(\s*(\w+)\s*,\s*(\w+)\s*\)").expect("gtest regex should compile")
});

static GENERIC_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(test_\w+)\s*\(").expect("generic test regex should compile")
});

/// Names of the test cases defined in `code`
pub fn extract_test_names(language: Language, code: &str) -> BTreeSet<String> {
    match language {
        Language::Python => first_group(&PYTHON_TEST_RE, code),
        Language::JavaScript | Language::TypeScript => any_group(&JS_TEST_RE, code),
        Language::Java => first_group(&JAVA_TEST_RE, code),
        Language::CSharp => first_group(&CSHARP_TEST_RE, code),
        Language::Go => first_group(&GO_TEST_RE, code),
        Language::Rust => first_group(&RUST_TEST_RE, code),
        Language::Ruby => any_group(&RUBY_TEST_RE, code),
        Language::Php => first_group(&PHP_TEST_RE, code),
        Language::C | Language::Cpp => GTEST_RE
            .captures_iter(code)
            .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
            .collect(),
        Language::Unknown => first_group(&GENERIC_TEST_RE, code),
    }
}

/// Class names whose redefinition would shadow existing tests
pub fn extract_test_containers(language: Language, code: &str) -> BTreeSet<String> {
    match language {
        Language::Python => first_group(&PYTHON_CLASS_RE, code),
        Language::Java
        | Language::CSharp
        | Language::JavaScript
        | Language::TypeScript
        | Language::Php
        | Language::Cpp => first_group(&CLASS_RE, code),
        _ => BTreeSet::new(),
    }
}

fn first_group(re: &Regex, code: &str) -> BTreeSet<String> {
    re.captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn any_group(re: &Regex, code: &str) -> BTreeSet<String> {
    re.captures_iter(code)
        .filter_map(|caps| caps.iter().skip(1).flatten().next())
        .map(|m| m.as_str().to_string())
        .collect()
}
