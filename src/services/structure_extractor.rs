//! Best-effort enumeration of functions, classes and methods.
//!
//! Python, JavaScript, TypeScript, Rust and Go are read from a tree-sitter
//! parse tree. Java, C#, C, C++, Ruby and PHP use line-oriented regex
//! heuristics with brace (or `end`) matching for spans. Files of unknown
//! language get a generic keyword scan (`def`, `function`, `func`, `fn`,
//! `class`, `struct`, ...).

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::domain::models::{ClassInfo, CodeStructure, FunctionInfo, Language, LineRange};
use crate::infrastructure::parsing::{self, field_text, node_text};

/// Declaration recognized at a syntax node
enum Decl {
    Function { name: String, signature: String },
    Class { name: String },
    /// A method attached to a named type outside its body (Go receivers)
    Method { owner: String, name: String, signature: String },
    /// Rust `impl` blocks: a class scope whose children are methods
    Impl { name: String },
}

/// Extracts functions and classes from source text
pub struct StructureExtractor;

impl StructureExtractor {
    /// Extract the structure of `source`. Never fails: unparseable input
    /// yields an empty structure.
    pub fn extract(language: Language, path: &str, source: &str) -> CodeStructure {
        if source.trim().is_empty() {
            return CodeStructure::empty();
        }

        let mut structure = if parsing::has_grammar(language) {
            match parsing::parse(language, path, source) {
                Ok(tree) => {
                    let mut structure = CodeStructure::empty();
                    walk(tree.root_node(), source, language, None, &mut structure);
                    structure
                }
                Err(e) => {
                    warn!(path, error = %e, "Parse failed, structure unavailable");
                    CodeStructure::empty()
                }
            }
        } else {
            heuristic::extract(language, source)
        };

        structure.coalesce_classes();
        debug!(
            path,
            functions = structure.functions.len(),
            classes = structure.classes.len(),
            methods = structure.method_count(),
            "Extracted structure"
        );
        structure
    }
}

fn line_range(node: Node<'_>) -> LineRange {
    LineRange::new(node.start_position().row + 1, node.end_position().row + 1)
}

/// Collapse whitespace in the header text preceding the node's body
fn signature(node: Node<'_>, source: &str) -> String {
    let end = node
        .child_by_field_name("body")
        .map_or(node.end_byte(), |body| body.start_byte());
    let header = source.get(node.start_byte()..end).unwrap_or("");
    let collapsed = header.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c == ':' || c == '{' || c == '=' || c.is_whitespace())
        .to_string()
}

/// Index into `structure.classes` of the class whose body we are inside
type ClassScope = Option<usize>;

fn walk(node: Node<'_>, source: &str, language: Language, scope: ClassScope, out: &mut CodeStructure) {
    let mut child_scope = scope;

    match classify(node, source, language) {
        Some(Decl::Class { name }) | Some(Decl::Impl { name }) => {
            out.classes.push(ClassInfo {
                name,
                line_range: line_range(node),
                methods: Vec::new(),
            });
            child_scope = Some(out.classes.len() - 1);
        }
        Some(Decl::Function { name, signature }) => {
            let info = FunctionInfo {
                name,
                signature,
                line_range: line_range(node),
            };
            match scope {
                Some(idx) => out.classes[idx].methods.push(info),
                None => out.functions.push(info),
            }
            // nested definitions inside a function are not methods
            child_scope = None;
        }
        Some(Decl::Method { owner, name, signature }) => {
            let info = FunctionInfo {
                name,
                signature,
                line_range: line_range(node),
            };
            out.classes.push(ClassInfo {
                name: owner,
                line_range: line_range(node),
                methods: vec![info],
            });
            child_scope = None;
        }
        None => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, language, child_scope, out);
    }
}

fn classify(node: Node<'_>, source: &str, language: Language) -> Option<Decl> {
    let name = |field: &str| field_text(node, field, source).map(str::to_string);

    match (language, node.kind()) {
        (Language::Python, "function_definition") => Some(Decl::Function {
            name: name("name")?,
            signature: signature(node, source),
        }),
        (Language::Python, "class_definition") => Some(Decl::Class { name: name("name")? }),

        (
            Language::JavaScript | Language::TypeScript,
            "function_declaration" | "generator_function_declaration" | "method_definition",
        ) => Some(Decl::Function {
            name: name("name")?,
            signature: signature(node, source),
        }),
        (Language::JavaScript | Language::TypeScript, "class_declaration" | "abstract_class_declaration") => {
            Some(Decl::Class { name: name("name")? })
        }
        (Language::JavaScript | Language::TypeScript, "variable_declarator") => {
            let value = node.child_by_field_name("value")?;
            if !matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                return None;
            }
            let binding = name("name")?;
            let header = signature(value, source);
            let params = header.split_once("=>").map_or(header.as_str(), |(p, _)| p).trim();
            Some(Decl::Function {
                signature: format!("{binding} = {params}"),
                name: binding,
            })
        }

        (Language::Rust, "function_item" | "function_signature_item") => Some(Decl::Function {
            name: name("name")?,
            signature: signature(node, source),
        }),
        (Language::Rust, "struct_item" | "enum_item" | "trait_item") => {
            Some(Decl::Class { name: name("name")? })
        }
        (Language::Rust, "impl_item") => {
            let ty = node.child_by_field_name("type")?;
            Some(Decl::Impl {
                name: base_type_name(node_text(ty, source)),
            })
        }

        (Language::Go, "function_declaration") => Some(Decl::Function {
            name: name("name")?,
            signature: signature(node, source),
        }),
        (Language::Go, "method_declaration") => {
            let receiver = node.child_by_field_name("receiver")?;
            Some(Decl::Method {
                owner: go_receiver_type(node_text(receiver, source)),
                name: name("name")?,
                signature: signature(node, source),
            })
        }
        (Language::Go, "type_spec") => {
            let ty = node.child_by_field_name("type")?;
            if matches!(ty.kind(), "struct_type" | "interface_type") {
                Some(Decl::Class { name: name("name")? })
            } else {
                None
            }
        }

        _ => None,
    }
}

/// `Vec<T>` → `Vec`, `&'a mut Foo` → `Foo`
fn base_type_name(ty: &str) -> String {
    ty.split(|c: char| c == '<' || c == '&' || c.is_whitespace())
        .find(|tok| !tok.is_empty() && !tok.starts_with('\'') && *tok != "mut" && *tok != "dyn")
        .unwrap_or(ty)
        .to_string()
}

/// `(s *Server)` → `Server`
fn go_receiver_type(receiver: &str) -> String {
    receiver
        .trim_matches(|c: char| c == '(' || c == ')')
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_start_matches('*')
        .split('[')
        .next()
        .unwrap_or("")
        .to_string()
}

mod heuristic {
    use super::*;

    static BRACE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^\s*(?:(?:public|private|protected|internal|abstract|final|static|sealed|partial|export|readonly)\s+)*(?:class|interface|enum|record|struct|trait)\s+([A-Za-z_]\w*)",
        )
        .expect("class regex should compile")
    });

    static BRACE_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|virtual|override|async|synchronized|inline|extern|unsafe|constexpr|explicit)\s+)*(?:[A-Za-z_][\w:<>,\[\]\*&\s\.?]*?\s+[\*&]*)?([A-Za-z_~]\w*)\s*\([^;]*\)?\s*(?:const\s*)?(?:throws\s+[\w\s,\.]+)?\s*(?:\{.*)?$",
        )
        .expect("function regex should compile")
    });

    static PHP_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?([A-Za-z_]\w*)\s*\(")
            .expect("php function regex should compile")
    });

    static RUBY_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\s*)(?:class|module)\s+([A-Z]\w*(?:::\w+)*)").expect("ruby class regex should compile")
    });

    static RUBY_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(\s*)def\s+(?:self\.)?([A-Za-z_]\w*[?!=]?)").expect("ruby def regex should compile")
    });

    const CONTROL_KEYWORDS: &[&str] = &[
        "if", "for", "while", "switch", "catch", "return", "sizeof", "foreach", "using", "lock", "else",
        "do", "new", "throw", "elseif", "fn", "function",
    ];

    static GENERIC_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b(?:def|function|func|fn)\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*\(")
            .expect("generic function regex should compile")
    });

    static C_STYLE_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?:[A-Za-z_][\w:<>\*&]*\s+)+\**([A-Za-z_]\w*)\s*\([^;{]*\)\s*\{")
            .expect("c-style function regex should compile")
    });

    static GENERIC_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b(?:class|struct|interface|trait|module)\s+([A-Za-z_]\w*)")
            .expect("generic class regex should compile")
    });

    pub(super) fn extract(language: Language, source: &str) -> CodeStructure {
        match language {
            Language::Ruby => extract_ruby(source),
            Language::Unknown => extract_generic(source),
            _ => extract_braced(language, source),
        }
    }

    /// Names that belong to test code rather than the code under test
    fn is_test_name(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower.contains("test") || lower.contains("spec")
    }

    /// Keyword scan for languages without a grammar or dedicated heuristic.
    /// Spans follow braces when the declaration opens one and cover the
    /// declaring line otherwise.
    fn extract_generic(source: &str) -> CodeStructure {
        let lines: Vec<&str> = source.lines().collect();
        let mut structure = CodeStructure::empty();
        let mut seen = std::collections::BTreeSet::new();
        // (class index, class end line)
        let mut open_classes: Vec<(usize, usize)> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            open_classes.retain(|(_, end)| *end > idx);
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*') {
                continue;
            }

            let end = if lines[idx..lines.len().min(idx + 2)].iter().any(|l| l.contains('{')) {
                block_end(&lines, idx)
            } else {
                idx
            };

            if let Some(caps) = GENERIC_CLASS_RE.captures(line) {
                let name = caps[1].to_string();
                if !is_test_name(&name) && seen.insert(format!("class {name}")) {
                    structure.classes.push(ClassInfo {
                        name,
                        line_range: LineRange::new(idx + 1, end + 1),
                        methods: Vec::new(),
                    });
                    open_classes.push((structure.classes.len() - 1, end));
                }
                continue;
            }

            let name = GENERIC_FUNCTION_RE
                .captures(line)
                .or_else(|| C_STYLE_FUNCTION_RE.captures(line))
                .map(|caps| caps[1].to_string());
            let Some(name) = name.filter(|n| !CONTROL_KEYWORDS.contains(&n.as_str()) && !is_test_name(n)) else {
                continue;
            };
            if !seen.insert(format!("fn {name}")) {
                continue;
            }
            let info = FunctionInfo {
                name,
                signature: trimmed.trim_end().trim_end_matches(['{', ':']).trim_end().to_string(),
                line_range: LineRange::new(idx + 1, end + 1),
            };
            match open_classes.last() {
                Some(&(class_idx, _)) => structure.classes[class_idx].methods.push(info),
                None => structure.functions.push(info),
            }
        }

        structure
    }

    /// Net brace depth change of a line, ignoring string and char literals
    /// and `//` comments
    fn brace_delta(line: &str) -> i64 {
        let mut delta = 0;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut prev = '\0';

        for c in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                prev = c;
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '/' if prev == '/' => break,
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            }
            prev = c;
        }
        delta
    }

    /// Last line of the block opening at `start`, found by brace matching
    fn block_end(lines: &[&str], start: usize) -> usize {
        let mut depth = 0_i64;
        let mut opened = false;

        for (offset, line) in lines[start..].iter().enumerate() {
            if line.contains('{') {
                opened = true;
            }
            depth += brace_delta(line);
            if opened && depth <= 0 {
                return start + offset;
            }
            // declaration without a body on the next lines
            if !opened && line.trim_end().ends_with(';') {
                return start + offset;
            }
        }
        lines.len().saturating_sub(1)
    }

    fn extract_braced(language: Language, source: &str) -> CodeStructure {
        let lines: Vec<&str> = source.lines().collect();
        let mut structure = CodeStructure::empty();
        // (class index, class end line, depth inside the class body)
        let mut open_classes: Vec<(usize, usize, i64)> = Vec::new();
        let mut depth = 0_i64;
        let mut skip_until: Option<usize> = None;

        for (idx, raw) in lines.iter().enumerate() {
            let line = raw.trim_end();
            open_classes.retain(|(_, end, _)| *end >= idx);

            let in_function = skip_until.is_some_and(|end| idx <= end);
            let trimmed = line.trim_start();
            let is_comment = trimmed.starts_with("//")
                || trimmed.starts_with('*')
                || trimmed.starts_with("/*")
                || trimmed.starts_with('#');

            if !in_function && !is_comment {
                if let Some(caps) = BRACE_CLASS_RE.captures(line) {
                    let end = block_end(&lines, idx);
                    structure.classes.push(ClassInfo {
                        name: caps[1].to_string(),
                        line_range: LineRange::new(idx + 1, end + 1),
                        methods: Vec::new(),
                    });
                    open_classes.push((structure.classes.len() - 1, end, depth + 1));
                } else if let Some(name) = function_name(language, line) {
                    let end = block_end(&lines, idx);
                    let body_follows = lines[idx..=end].iter().any(|l| l.contains('{'));
                    if body_follows || language == Language::Php {
                        let info = FunctionInfo {
                            name,
                            signature: line.trim().trim_end_matches('{').trim_end().to_string(),
                            line_range: LineRange::new(idx + 1, end + 1),
                        };
                        match open_classes.last() {
                            Some(&(class_idx, _, class_depth)) if depth == class_depth => {
                                structure.classes[class_idx].methods.push(info);
                            }
                            _ => structure.functions.push(info),
                        }
                        skip_until = Some(end);
                    }
                }
            }

            if !is_comment {
                depth += brace_delta(line);
            }
        }

        structure
    }

    fn function_name(language: Language, line: &str) -> Option<String> {
        let name = if language == Language::Php {
            PHP_FUNCTION_RE.captures(line)?.get(1)?.as_str()
        } else {
            let caps = BRACE_FUNCTION_RE.captures(line)?;
            caps.get(1)?.as_str()
        };
        if CONTROL_KEYWORDS.contains(&name) {
            return None;
        }
        // a call statement, not a declaration
        if line.trim_end().ends_with(';') || line.trim_start().starts_with("return") {
            return None;
        }
        Some(name.to_string())
    }

    fn indent_of(line: &str) -> usize {
        line.len() - line.trim_start().len()
    }

    /// Line of the `end` closing a Ruby block opened at `start`
    fn ruby_block_end(lines: &[&str], start: usize) -> usize {
        let indent = indent_of(lines[start]);
        lines
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|(_, l)| indent_of(l) == indent && l.trim() == "end")
            .map_or(lines.len().saturating_sub(1), |(i, _)| i)
    }

    fn extract_ruby(source: &str) -> CodeStructure {
        let lines: Vec<&str> = source.lines().collect();
        let mut structure = CodeStructure::empty();
        let mut open_classes: Vec<(usize, usize)> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            open_classes.retain(|(_, end)| *end >= idx);

            if let Some(caps) = RUBY_CLASS_RE.captures(line) {
                let end = ruby_block_end(&lines, idx);
                structure.classes.push(ClassInfo {
                    name: caps[2].to_string(),
                    line_range: LineRange::new(idx + 1, end + 1),
                    methods: Vec::new(),
                });
                open_classes.push((structure.classes.len() - 1, end));
            } else if let Some(caps) = RUBY_DEF_RE.captures(line) {
                let end = ruby_block_end(&lines, idx);
                let info = FunctionInfo {
                    name: caps[2].to_string(),
                    signature: line.trim().to_string(),
                    line_range: LineRange::new(idx + 1, end + 1),
                };
                match open_classes.last() {
                    Some(&(class_idx, _)) => structure.classes[class_idx].methods.push(info),
                    None => structure.functions.push(info),
                }
            }
        }

        structure
    }
}
