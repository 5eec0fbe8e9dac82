//! Deterministic prompt construction for one candidate.

use std::fmt::Write as _;

use crate::domain::models::{CodeStructure, GenerationRequest, ModelConfig};
use crate::domain::ports::{ChatMessage, CompletionRequest};

/// Fixed role framing for every request
pub const SYSTEM_PROMPT: &str = "You are an expert software engineer specializing in writing \
comprehensive unit tests. Generate clean, well-documented, and thorough test cases that follow \
best practices for the given programming language and test framework. Return only the test code \
in a single fenced code block, with no explanatory text.";

/// Two-part instruction sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Role framing
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Chat request for this prompt under the model settings
    pub fn to_request(&self, model: &ModelConfig) -> CompletionRequest {
        CompletionRequest {
            model: model.id.clone(),
            messages: vec![
                ChatMessage::system(self.system.clone()),
                ChatMessage::user(self.user.clone()),
            ],
            temperature: model.temperature,
            top_p: model.top_p,
            max_tokens: model.max_tokens,
        }
    }
}

/// Builds prompts, truncating oversized sources
pub struct PromptBuilder {
    max_source_chars: usize,
}

impl PromptBuilder {
    /// Create a builder that keeps at most `max_source_chars` of source
    pub fn new(max_source_chars: usize) -> Self {
        Self { max_source_chars }
    }

    /// Build the prompt for `request`
    pub fn build(&self, request: &GenerationRequest) -> Prompt {
        let language = request.language.as_str();
        let framework = request.framework.as_str();
        let source = truncate_source(&request.source, self.max_source_chars);
        let fence = fence_for(&source);

        let mut user = String::new();
        let _ = writeln!(
            user,
            "Generate unit tests for the following {language} source file: {}",
            request.candidate.path
        );
        let _ = writeln!(user);
        let _ = writeln!(user, "Current test coverage: {:.1}%", request.candidate.coverage_pct);
        let _ = writeln!(user, "Test framework: {framework}");
        let _ = writeln!(user, "Test file: {}", request.test_file);
        let _ = writeln!(user);

        let _ = writeln!(user, "Requirements:");
        for (i, requirement) in [
            "Cover all public functions and methods.".to_string(),
            "Test the happy path for each behavior.".to_string(),
            "Test error conditions and exception handling.".to_string(),
            "Add boundary value tests (empty, zero, negative, maximum inputs).".to_string(),
            format!("Follow idiomatic {framework} conventions and use descriptive test names."),
            "Include the imports the tests need; mock external dependencies.".to_string(),
            "Return only test code inside one fenced code block.".to_string(),
        ]
        .iter()
        .enumerate()
        {
            let _ = writeln!(user, "{}. {requirement}", i + 1);
        }
        let _ = writeln!(user);

        let _ = writeln!(user, "Code structure:");
        user.push_str(&summarize_structure(&request.structure));
        let _ = writeln!(user);

        if !request.existing_tests.is_empty() {
            let names: Vec<&str> = request.existing_tests.iter().map(String::as_str).collect();
            let _ = writeln!(
                user,
                "Tests already present in {} (do not repeat them): {}",
                request.test_file,
                names.join(", ")
            );
            let _ = writeln!(user);
        }

        let _ = writeln!(user, "SOURCE CODE:");
        let _ = writeln!(user, "{fence}{language}");
        user.push_str(&source);
        if !source.ends_with('\n') {
            user.push('\n');
        }
        let _ = writeln!(user, "{fence}");

        Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

/// Indented listing of functions and classes with signatures and spans
pub fn summarize_structure(structure: &CodeStructure) -> String {
    if structure.is_empty() {
        return "- (no functions or classes recognized)\n".to_string();
    }

    let mut out = String::new();
    for function in &structure.functions {
        let _ = writeln!(
            out,
            "- function {} (lines {}-{})",
            function.signature, function.line_range.start, function.line_range.end
        );
    }
    for class in &structure.classes {
        let _ = writeln!(
            out,
            "- class {} (lines {}-{})",
            class.name, class.line_range.start, class.line_range.end
        );
        for method in &class.methods {
            let _ = writeln!(
                out,
                "  - method {} (lines {}-{})",
                method.signature, method.line_range.start, method.line_range.end
            );
        }
    }
    out
}

/// Cut at the last line boundary within `max_chars` and mark the cut
pub fn truncate_source(source: &str, max_chars: usize) -> String {
    if source.chars().count() <= max_chars {
        return source.to_string();
    }

    let mut kept = String::new();
    let mut kept_lines = 0;
    for line in source.split_inclusive('\n') {
        if kept.chars().count() + line.chars().count() > max_chars {
            break;
        }
        kept.push_str(line);
        kept_lines += 1;
    }

    let total_lines = source.lines().count();
    if !kept.is_empty() && !kept.ends_with('\n') {
        kept.push('\n');
    }
    let _ = writeln!(
        kept,
        "... [source truncated: {} of {} lines shown] ...",
        kept_lines, total_lines
    );
    kept
}

/// A backtick fence longer than any run inside the source
fn fence_for(source: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in source.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
