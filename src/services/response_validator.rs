//! Extraction and syntax checking of model output.
//!
//! Every input resolves to a [`ValidationStatus`]; nothing here returns an
//! error or panics on malformed text.

use tracing::debug;

use super::test_names::extract_test_names;
use crate::domain::models::{CandidateFile, GenerationResult, Language, ValidationStatus};
use crate::infrastructure::parsing;

/// Fence tags that never carry test code
const NON_CODE_TAGS: &[&str] = &[
    "bash", "sh", "shell", "console", "text", "plaintext", "txt", "output", "json", "yaml", "yml",
    "toml", "ini", "diff", "markdown", "md",
];

/// Turns raw model text into a validated result
pub struct ResponseValidator;

impl ResponseValidator {
    /// Finalize a model response for `candidate`.
    ///
    /// `test_file` picks the grammar variant (TSX versus TypeScript).
    pub fn validate(candidate: &CandidateFile, test_file: &str, raw_model_text: String) -> GenerationResult {
        let language = candidate.language;
        let (status, code, test_names) = match extract_code(&raw_model_text, language) {
            Extracted::Nothing => (ValidationStatus::Empty, None, Default::default()),
            Extracted::Fenced(code) => {
                if check_syntax(language, test_file, &code) {
                    let names = extract_test_names(language, &code);
                    (ValidationStatus::Valid, Some(code), names)
                } else {
                    (ValidationStatus::SyntaxError, None, Default::default())
                }
            }
            Extracted::Bare(text) => {
                // unfenced text counts as code only when it defines tests
                let names = extract_test_names(language, &text);
                if names.is_empty() {
                    (ValidationStatus::Empty, None, Default::default())
                } else if check_syntax(language, test_file, &text) {
                    (ValidationStatus::Valid, Some(text), names)
                } else {
                    (ValidationStatus::SyntaxError, None, Default::default())
                }
            }
        };

        debug!(
            path = %candidate.path,
            status = %status,
            tests = test_names.len(),
            "Validated model response"
        );

        GenerationResult {
            candidate: candidate.clone(),
            raw_model_text,
            extracted_code: code,
            validation_status: status,
            test_names,
        }
    }
}

/// What the response contained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// No code at all
    Nothing,
    /// Concatenated fenced blocks
    Fenced(String),
    /// Whole response, no fences present
    Bare(String),
}

struct Fence {
    marker: char,
    width: usize,
    tag: String,
}

fn open_fence(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let width = trimmed.chars().take_while(|c| *c == marker).count();
    if width < 3 {
        return None;
    }
    let info = trimmed[width..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    let tag = info
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    Some(Fence { marker, width, tag })
}

fn closes(fence: &Fence, line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence.width && trimmed.chars().all(|c| c == fence.marker)
}

fn accepts_tag(language: Language, tag: &str) -> bool {
    if tag.is_empty() || language.fence_aliases().contains(&tag) {
        return true;
    }
    if NON_CODE_TAGS.contains(&tag) {
        return false;
    }
    let sibling = match language {
        Language::TypeScript => Some(Language::JavaScript),
        Language::C => Some(Language::Cpp),
        Language::Cpp => Some(Language::C),
        _ => None,
    };
    if sibling.is_some_and(|s| s.fence_aliases().contains(&tag)) {
        return true;
    }
    // a tag naming some other known language is an aside, anything else is kept
    !Language::ALL
        .iter()
        .any(|other| *other != language && other.fence_aliases().contains(&tag))
}

/// Pull the code out of a model response.
///
/// Fenced blocks (backtick or tilde, three or more) are concatenated in order
/// of appearance, skipping blocks tagged with another language. An
/// unterminated fence runs to the end of the text.
pub fn extract_code(raw: &str, language: Language) -> Extracted {
    let mut blocks: Vec<String> = Vec::new();
    let mut saw_fence = false;
    let mut current: Option<(Fence, bool, String)> = None;

    for line in raw.lines() {
        match current.as_mut() {
            None => {
                if let Some(fence) = open_fence(line) {
                    saw_fence = true;
                    let keep = accepts_tag(language, &fence.tag);
                    current = Some((fence, keep, String::new()));
                }
            }
            Some((fence, keep, body)) => {
                if closes(fence, line) {
                    if *keep {
                        blocks.push(std::mem::take(body));
                    }
                    current = None;
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
            }
        }
    }
    if let Some((_, true, body)) = current {
        blocks.push(body);
    }

    if saw_fence {
        let code: Vec<String> = blocks.into_iter().filter(|b| !b.trim().is_empty()).collect();
        if code.is_empty() {
            return Extracted::Nothing;
        }
        return Extracted::Fenced(code.join("\n"));
    }

    if raw.trim().is_empty() {
        Extracted::Nothing
    } else {
        let mut text = raw.trim_matches('\n').to_string();
        text.push('\n');
        Extracted::Bare(text)
    }
}

/// Whether `code` is syntactically acceptable for `language`
pub fn check_syntax(language: Language, path: &str, code: &str) -> bool {
    if parsing::has_grammar(language) {
        return match parsing::parse(language, path, code) {
            Ok(tree) => !tree.root_node().has_error(),
            Err(e) => {
                debug!(error = %e, "Falling back to delimiter scan");
                delimiters_balanced(language, code)
            }
        };
    }
    delimiters_balanced(language, code)
}

/// Brackets, braces and parentheses balance outside strings and comments
pub fn delimiters_balanced(language: Language, code: &str) -> bool {
    let hash_comments = matches!(language, Language::Ruby | Language::Php | Language::C | Language::Cpp);
    let mut stack: Vec<char> = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars),
            '#' if hash_comments => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        closed = true;
                        break;
                    }
                    prev = next;
                }
                if !closed {
                    return false;
                }
            }
            '"' | '\'' | '`' => {
                let mut escaped = false;
                let mut closed = false;
                for next in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        closed = true;
                        break;
                    } else if next == '\n' && c != '`' {
                        break;
                    }
                }
                if !closed {
                    return false;
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for next in chars.by_ref() {
        if next == '\n' {
            break;
        }
    }
}
