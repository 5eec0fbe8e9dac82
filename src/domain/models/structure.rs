//! Lightweight structural summary of a source file.

use serde::{Deserialize, Serialize};

/// Inclusive, 1-based line span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// First line, 1-based
    pub start: usize,
    /// Last line, inclusive
    pub end: usize,
}

impl LineRange {
    /// Range from `start` to `end`
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A function or method declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    /// Function name
    pub name: String,
    /// Declaration header with whitespace collapsed, body excluded
    pub signature: String,
    /// Span in the source
    pub line_range: LineRange,
}

/// A class-like declaration (class, struct, interface, impl target)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Class name
    pub name: String,
    /// Span in the source
    pub line_range: LineRange,
    /// Methods in source order
    pub methods: Vec<FunctionInfo>,
}

/// Functions and classes of a file in source order.
///
/// Extraction is best effort: an empty structure means nothing could be
/// recognized, never that extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStructure {
    /// Free functions
    pub functions: Vec<FunctionInfo>,
    /// Classes with their methods
    pub classes: Vec<ClassInfo>,
}

impl CodeStructure {
    /// Structure with nothing in it
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether nothing was found
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty()
    }

    /// Methods across all classes
    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Merge class entries with the same name, keeping the first position.
    ///
    /// Languages like Rust and Go spread a type's methods over several
    /// blocks; the summary presents them as one class.
    pub fn coalesce_classes(&mut self) {
        let mut merged: Vec<ClassInfo> = Vec::with_capacity(self.classes.len());
        for class in self.classes.drain(..) {
            if let Some(existing) = merged.iter_mut().find(|c| c.name == class.name) {
                existing.methods.extend(class.methods);
                existing.line_range.end = existing.line_range.end.max(class.line_range.end);
            } else {
                merged.push(class);
            }
        }
        self.classes = merged;
    }
}
