//! tree-sitter grammar registry
//!
//! Grammars are compiled in for Python, JavaScript, TypeScript (and TSX),
//! Rust and Go. Other languages fall back to text heuristics in the services
//! that consume parse trees.

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

use crate::domain::models::Language;

/// Failures preparing a tree-sitter parse
#[derive(Error, Debug)]
pub enum ParseError {
    /// No grammar is compiled in for the language
    #[error("No grammar available for {0}")]
    Unsupported(Language),

    /// The grammar was rejected by the parser
    #[error("Failed to load {language} grammar: {message}")]
    Grammar {
        /// Language of the grammar
        language: Language,
        /// Parser message
        message: String,
    },

    /// Parsing returned no tree
    #[error("Parser produced no tree for {0} source")]
    NoTree(Language),
}

/// Whether a tree-sitter grammar is compiled in for `language`
pub const fn has_grammar(language: Language) -> bool {
    matches!(
        language,
        Language::Python | Language::JavaScript | Language::TypeScript | Language::Rust | Language::Go
    )
}

/// Resolve the grammar, choosing TSX for `.tsx` paths
pub fn grammar_for(language: Language, path: &str) -> Option<tree_sitter::Language> {
    let grammar = match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript if path.to_ascii_lowercase().ends_with(".tsx") => {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        }
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        _ => return None,
    };
    Some(grammar)
}

/// Parse `source` with the grammar for `language`
pub fn parse(language: Language, path: &str, source: &str) -> Result<Tree, ParseError> {
    let grammar = grammar_for(language, path).ok_or(ParseError::Unsupported(language))?;
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| ParseError::Grammar {
            language,
            message: format!("{e:?}"),
        })?;
    parser.parse(source, None).ok_or(ParseError::NoTree(language))
}

/// Source text covered by `node`
pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Text of the named field child, if present
pub fn field_text<'a>(node: Node<'_>, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|child| node_text(child, source))
}
