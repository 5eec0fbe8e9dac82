//! Merging validated test code into a test artifact.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::test_names::{extract_test_containers, extract_test_names};
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::models::{GenerationResult, Language};

/// Line-level change to one artifact
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffSummary {
    /// Lines present only in the merged content
    pub lines_added: usize,
    /// Lines present only in the original
    pub lines_removed: usize,
    /// Unified diff of the artifact
    pub patch: String,
}

/// Merged artifact content and what it adds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Full artifact content after merging
    pub content: String,
    /// Change relative to the original
    pub diff: DiffSummary,
    /// Names of the tests the merge adds
    pub tests_added: BTreeSet<String>,
}

/// Outcome of merging one result into its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    /// New tests were merged (and written, in apply mode)
    Merged {
        /// The merged content
        plan: MergePlan,
        /// Whether the artifact was written
        written: bool,
    },
    /// Every generated test is already present
    NothingNew,
}

/// Merges generated tests into artifacts, writing only in apply mode
#[derive(Debug, Clone, Copy)]
pub struct TestMerger {
    apply: bool,
}

impl TestMerger {
    /// Create a merger; writes happen only when `apply` is set
    pub fn new(apply: bool) -> Self {
        Self { apply }
    }

    /// Merge a valid result into the artifact at `artifact_path`.
    ///
    /// `existing` is the artifact's current content (`None` when absent) and
    /// `test_file` the repository-relative name used in the patch header.
    pub async fn merge(
        &self,
        result: &GenerationResult,
        test_file: &str,
        artifact_path: &Path,
        existing: Option<&str>,
    ) -> PipelineResult<MergeDecision> {
        let Some(code) = result.extracted_code.as_deref().filter(|_| result.is_valid()) else {
            return Err(PipelineError::ValidationFailure(result.validation_status));
        };

        let Some(plan) = plan_merge(result.candidate.language, test_file, existing, code) else {
            debug!(test_file, "Generated tests already present");
            return Ok(MergeDecision::NothingNew);
        };

        if self.apply {
            if let Some(parent) = artifact_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PipelineError::io(parent, e))?;
            }
            tokio::fs::write(artifact_path, &plan.content)
                .await
                .map_err(|e| PipelineError::io(artifact_path, e))?;
            info!(
                test_file,
                tests_added = plan.tests_added.len(),
                lines_added = plan.diff.lines_added,
                "Wrote test artifact"
            );
        }

        Ok(MergeDecision::Merged {
            plan,
            written: self.apply,
        })
    }
}

/// Current content of an artifact, `None` when it does not exist yet
pub async fn read_artifact(path: &Path) -> PipelineResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Compute the merged artifact without touching the filesystem.
///
/// Returns `None` when the generated code adds no test that is not already
/// present in `existing`. New imports join the artifact's import section and
/// tests for a container the artifact already declares are moved into it;
/// everything else is appended.
pub fn plan_merge(
    language: Language,
    test_file: &str,
    existing: Option<&str>,
    generated: &str,
) -> Option<MergePlan> {
    let mut merge = Merge::new(language, existing.unwrap_or(""));
    for block in segment(language, generated) {
        merge.add_block(&block);
    }
    if merge.tests_added.is_empty() {
        return None;
    }

    let content = merge.content();
    let diff = diff_summary(test_file, existing, &content);
    Some(MergePlan {
        content,
        diff,
        tests_added: merge.tests_added,
    })
}

/// Position in the existing artifact where text is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    line: usize,
    /// Byte offset within `line`; `None` inserts before the whole line
    offset: Option<usize>,
}

#[derive(Debug)]
struct Insertion {
    anchor: Anchor,
    text: String,
}

/// Imports and containers already present in the artifact
#[derive(Debug, Default)]
struct ArtifactIndex {
    /// Normalized keys of every imported entry
    imports: BTreeSet<String>,
    /// Import group identity to the line of its closing bracket
    groups: BTreeMap<String, usize>,
    /// Line just after the last import statement
    import_end: Option<usize>,
    /// Container name to the position of its closing brace
    containers: BTreeMap<String, Anchor>,
}

impl ArtifactIndex {
    fn scan(language: Language, lines: &[&str]) -> Self {
        let mut index = Self::default();
        let mut i = 0;
        while i < lines.len() {
            if let Some(end) = import_group_end(lines, i) {
                let id = group_id(lines[i], lines[end]);
                for entry in &lines[i + 1..end] {
                    if let Some(key) = entry_key(&id, entry) {
                        index.imports.insert(key);
                    }
                }
                index.groups.entry(id).or_insert(end);
                index.import_end = Some(end + 1);
                i = end + 1;
                continue;
            }
            if is_import_like(lines[i]) {
                index.imports.insert(lines[i].trim_end().to_string());
                index.import_end = Some(i + 1);
            }
            i += 1;
        }
        if is_braced(language) {
            index.containers = scan_containers(lines);
        }
        index
    }
}

/// Working state while generated blocks are merged into one artifact
struct Merge<'a> {
    language: Language,
    existing: &'a str,
    index: ArtifactIndex,
    existing_names: BTreeSet<String>,
    seen_names: BTreeSet<String>,
    taken_containers: BTreeSet<String>,
    inserts: Vec<Insertion>,
    appended: String,
    tests_added: BTreeSet<String>,
    hoisted_to_top: bool,
}

impl<'a> Merge<'a> {
    fn new(language: Language, existing: &'a str) -> Self {
        let lines: Vec<&str> = existing.lines().collect();
        let existing_names = extract_test_names(language, existing);
        Self {
            language,
            existing,
            index: ArtifactIndex::scan(language, &lines),
            seen_names: existing_names.clone(),
            existing_names,
            taken_containers: extract_test_containers(language, existing),
            inserts: Vec::new(),
            appended: String::new(),
            tests_added: BTreeSet::new(),
            hoisted_to_top: false,
        }
    }

    fn add_block(&mut self, block: &str) {
        let block = self.take_imports(block);
        if block.trim().is_empty() {
            return;
        }

        let block = if extract_test_names(self.language, &block).is_empty() {
            if self.existing.contains(block.trim()) || self.appended.contains(block.trim()) {
                return;
            }
            block
        } else {
            match self.prune(&block) {
                Some(pruned) => pruned,
                None => return,
            }
        };

        let names = extract_test_names(self.language, &block);
        if !self.fold(&block) {
            let block = rename_taken_containers(self.language, &block, &mut self.taken_containers);
            self.appended.push_str(&block);
        }
        for name in names {
            if !self.existing_names.contains(&name) {
                self.tests_added.insert(name.clone());
            }
            self.seen_names.insert(name);
        }
    }

    /// Remove import statements from `block`, hoisting the new ones into the
    /// artifact's import section. Returns the rest of the block.
    fn take_imports(&mut self, block: &str) -> String {
        let lines: Vec<&str> = block.lines().collect();
        let mut rest = String::with_capacity(block.len());
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if let Some(end) = import_group_end(&lines, i) {
                let id = group_id(line, lines[end]);
                let fresh: Vec<&str> = lines[i + 1..end]
                    .iter()
                    .copied()
                    .filter(|entry| entry_key(&id, entry).is_some_and(|key| self.index.imports.insert(key)))
                    .collect();
                if !fresh.is_empty() {
                    self.place_group(&id, line, &fresh, lines[end], &mut rest);
                }
                i = end + 1;
                continue;
            }
            if is_import_like(line) {
                if self.index.imports.insert(line.trim_end().to_string()) {
                    self.place_import(format!("{line}\n"), &mut rest);
                }
            } else {
                rest.push_str(line);
                rest.push('\n');
            }
            i += 1;
        }
        rest
    }

    /// New entries join an existing group of the same identity; otherwise the
    /// group is emitted with only its new entries
    fn place_group(&mut self, id: &str, opener: &str, fresh: &[&str], closer: &str, rest: &mut String) {
        let entries: String = fresh.iter().map(|entry| format!("{entry}\n")).collect();
        if let Some(&line) = self.index.groups.get(id) {
            self.inserts.push(Insertion {
                anchor: Anchor { line, offset: None },
                text: entries,
            });
            return;
        }
        self.place_import(format!("{opener}\n{entries}{closer}\n"), rest);
    }

    fn place_import(&mut self, text: String, rest: &mut String) {
        if self.existing.trim().is_empty() {
            rest.push_str(&text);
            return;
        }
        self.hoisted_to_top |= self.index.import_end.is_none();
        self.inserts.push(Insertion {
            anchor: Anchor {
                line: self.index.import_end.unwrap_or(0),
                offset: None,
            },
            text,
        });
    }

    /// Drop member tests that already exist, descending into containers.
    ///
    /// `None` when every test in `block` is already present.
    fn prune(&self, block: &str) -> Option<String> {
        let names = extract_test_names(self.language, block);
        if names.is_empty() || names.is_disjoint(&self.seen_names) {
            return Some(block.to_string());
        }
        if names.is_subset(&self.seen_names) {
            return None;
        }
        let Some(container) = split_container(self.language, block) else {
            return Some(block.to_string());
        };
        let kept: Vec<String> = container.members.iter().filter_map(|m| self.prune(m)).collect();
        Some(container.rebuild(&kept))
    }

    /// Move the members of a container the artifact already declares into
    /// it. Returns false when `block` is not such a container.
    fn fold(&mut self, block: &str) -> bool {
        let Some(container) = split_container(self.language, block) else {
            return false;
        };
        let Some(anchor) = container
            .name
            .as_ref()
            .and_then(|name| self.index.containers.get(name))
            .copied()
        else {
            return false;
        };

        for member in &container.members {
            let trimmed = member.trim();
            if trimmed.is_empty() {
                continue;
            }
            let names = extract_test_names(self.language, member);
            let present = if names.is_empty() {
                self.existing.contains(trimmed)
            } else {
                names.is_subset(&self.seen_names)
            };
            if present || self.fold(member) {
                continue;
            }
            self.inserts.push(Insertion {
                anchor,
                text: format!("\n{}\n", member.trim_end_matches('\n')),
            });
        }
        true
    }

    fn content(&self) -> String {
        let mut content = self.rebuild_existing().trim_end_matches('\n').to_string();
        let appended = self.appended.trim_matches('\n');
        if !appended.is_empty() {
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str(appended);
        }
        content.push('\n');
        content
    }

    fn rebuild_existing(&self) -> String {
        if self.inserts.is_empty() {
            return self.existing.to_string();
        }
        let lines: Vec<&str> = self.existing.lines().collect();
        let extra: usize = self.inserts.iter().map(|ins| ins.text.len()).sum();
        let mut out = String::with_capacity(self.existing.len() + extra + 1);

        for (i, line) in lines.iter().enumerate() {
            self.emit_at(Anchor { line: i, offset: None }, &mut out);
            if i == 0 && self.hoisted_to_top {
                out.push('\n');
            }
            let split = self
                .inserts
                .iter()
                .filter(|ins| ins.anchor.line == i)
                .find_map(|ins| ins.anchor.offset)
                .filter(|&offset| line.is_char_boundary(offset));
            let Some(offset) = split else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            let (head, tail) = line.split_at(offset);
            out.push_str(head.trim_end());
            out.push('\n');
            self.emit_at(Anchor { line: i, offset: Some(offset) }, &mut out);
            out.push_str(&line[..line.len() - line.trim_start().len()]);
            out.push_str(tail);
            out.push('\n');
        }
        self.emit_at(
            Anchor {
                line: lines.len(),
                offset: None,
            },
            &mut out,
        );
        out
    }

    fn emit_at(&self, anchor: Anchor, out: &mut String) {
        for ins in self.inserts.iter().filter(|ins| ins.anchor == anchor) {
            out.push_str(&ins.text);
        }
    }
}

/// Container block split into its opening lines, members and closing line
#[derive(Debug)]
struct Container {
    header: String,
    members: Vec<String>,
    closer: String,
    /// Indentation stripped from the members
    indent: String,
    name: Option<String>,
}

impl Container {
    fn rebuild(&self, members: &[String]) -> String {
        let mut out = self.header.clone();
        for line in members.iter().flat_map(|m| m.lines()) {
            if !line.trim().is_empty() {
                out.push_str(&self.indent);
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.closer);
        out
    }
}

fn split_container(language: Language, block: &str) -> Option<Container> {
    match language {
        Language::Python => split_indented_container(block),
        Language::Ruby | Language::Unknown => None,
        _ => split_braced_container(block),
    }
}

fn split_braced_container(block: &str) -> Option<Container> {
    let lines: Vec<&str> = block.lines().collect();
    let last = lines.iter().rposition(|l| !l.trim().is_empty())?;

    let mut depth = 0;
    let mut header_end = None;
    for (i, line) in lines[..last].iter().enumerate() {
        depth += bracket_delta(line);
        if depth > 0 {
            header_end = Some(i);
            break;
        }
    }
    let header_end = header_end?;
    let closer = lines[last];
    let body = &lines[header_end + 1..last];
    if !closer.trim_start().starts_with('}')
        || depth + bracket_delta(closer) != 0
        || body.iter().map(|l| bracket_delta(l)).sum::<i64>() != 0
    {
        return None;
    }

    Some(Container {
        header: join_lines(&lines[..=header_end]),
        members: segment_braced(&join_lines(body)),
        closer: format!("{closer}\n"),
        indent: String::new(),
        name: lines[..=header_end].iter().find_map(|l| container_name(l)),
    })
}

fn split_indented_container(block: &str) -> Option<Container> {
    let lines: Vec<&str> = block.lines().collect();
    let header_end = lines.iter().position(|l| l.starts_with("class "))?;
    let body = &lines[header_end + 1..];
    let first = body.iter().find(|l| !l.trim().is_empty())?;
    let indent = &first[..first.len() - first.trim_start().len()];
    if indent.is_empty() {
        return None;
    }

    let dedented: Vec<&str> = body
        .iter()
        .map(|l| l.strip_prefix(indent).unwrap_or_else(|| l.trim_start()))
        .collect();
    Some(Container {
        header: join_lines(&lines[..=header_end]),
        members: segment_indented(&join_lines(&dedented)),
        closer: String::new(),
        indent: indent.to_string(),
        name: None,
    })
}

fn join_lines(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

const fn is_braced(language: Language) -> bool {
    !matches!(language, Language::Python | Language::Ruby | Language::Unknown)
}

static CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|sealed|partial|export|default|pub(?:\([^)]*\))?)\s+)*(?:class|struct|interface|mod|namespace)\s+([A-Za-z_]\w*)",
    )
    .expect("container regex should compile")
});

fn container_name(line: &str) -> Option<String> {
    CONTAINER_RE.captures(line).map(|caps| caps[1].to_string())
}

/// Closing-brace positions of every named container, first occurrence wins
fn scan_containers(lines: &[&str]) -> BTreeMap<String, Anchor> {
    let mut found = BTreeMap::new();
    let mut open: Vec<(String, i64)> = Vec::new();
    let mut pending: Option<String> = None;
    let mut depth: i64 = 0;

    for (i, line) in lines.iter().enumerate() {
        if let Some(name) = container_name(line) {
            pending = Some(name);
        }
        for (offset, c) in brackets(line) {
            match c {
                '{' => {
                    if let Some(name) = pending.take() {
                        open.push((name, depth));
                    }
                    depth += 1;
                }
                '(' | '[' => depth += 1,
                _ => {
                    depth -= 1;
                    if open.last().is_some_and(|(_, d)| *d == depth) {
                        if let Some((name, _)) = open.pop() {
                            let offset = (!line[..offset].trim().is_empty()).then_some(offset);
                            found.entry(name).or_insert(Anchor { line: i, offset });
                        }
                    }
                }
            }
        }
        if line.trim_end().ends_with(';') {
            pending = None;
        }
    }
    found
}

/// Closing line of the bracketed import group opened at `start`
fn import_group_end(lines: &[&str], start: usize) -> Option<usize> {
    let opener = lines[start];
    if !is_import_like(opener) || bracket_delta(opener) <= 0 {
        return None;
    }
    lines
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, l)| l.trim_start().starts_with([')', '}']))
        .map(|(i, _)| i)
}

/// Identity of an import group. A Go `import (` group keys its entries the
/// same way as single-line `import` statements.
fn group_id(opener: &str, closer: &str) -> String {
    let prefix = opener.trim_end().trim_end_matches(['(', '{']).trim_end();
    let suffix = closer.trim().trim_start_matches([')', '}']).trim();
    if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix} {suffix}")
    }
}

fn entry_key(id: &str, entry: &str) -> Option<String> {
    let entry = entry.trim().trim_end_matches([',', ';']).trim_end();
    (!entry.is_empty()).then(|| format!("{id} {entry}"))
}

/// Split generated code into top-level blocks, each ending with its newline
pub fn segment(language: Language, code: &str) -> Vec<String> {
    match language {
        Language::Python => segment_indented(code),
        Language::Ruby | Language::Unknown => vec![ensure_newline(code)],
        _ => segment_braced(code),
    }
}

fn ensure_newline(text: &str) -> String {
    let mut out = text.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn segment_indented(code: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut has_statement = false;

    for line in code.lines() {
        let trimmed = line.trim_start();
        let top_level = !trimmed.is_empty()
            && !line.starts_with(char::is_whitespace)
            && !trimmed.starts_with([')', ']', '}']);

        if top_level && has_statement {
            blocks.push(std::mem::take(&mut current));
            has_statement = false;
        }
        current.push_str(line);
        current.push('\n');
        // decorators and comments attach to the statement that follows
        if top_level && !trimmed.starts_with('@') && !trimmed.starts_with('#') {
            has_statement = true;
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

fn segment_braced(code: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth: i64 = 0;

    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() && depth == 0 && current.is_empty() {
            if let Some(last) = blocks.last_mut() {
                last.push('\n');
            }
            continue;
        }

        current.push_str(line);
        current.push('\n');
        depth += bracket_delta(line);

        let attaches_forward = trimmed.is_empty()
            || (trimmed.starts_with('@') && !trimmed.ends_with(['}', ';']))
            || trimmed.starts_with("#[")
            || trimmed.starts_with("//")
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
            || (trimmed.starts_with('[') && trimmed.ends_with(']'))
            || trimmed.ends_with([',', '(', '=', '.', '{', '+', '&', '|']);
        if depth <= 0 && !attaches_forward {
            blocks.push(std::mem::take(&mut current));
            depth = 0;
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Byte offsets of the brackets in one line, ignoring strings and line comments
fn brackets(line: &str) -> Vec<(usize, char)> {
    let mut found = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = '\0';

    for (offset, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if prev == '/' => break,
            '"' | '\'' | '`' => quote = Some(c),
            '{' | '(' | '[' | '}' | ')' | ']' => found.push((offset, c)),
            _ => {}
        }
        prev = c;
    }
    found
}

/// Net bracket nesting change of one line
fn bracket_delta(line: &str) -> i64 {
    brackets(line)
        .iter()
        .map(|&(_, c)| if matches!(c, '{' | '(' | '[') { 1 } else { -1 })
        .sum()
}

fn is_import_like(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let line = line.trim_end();
    line.starts_with("import ")
        || (line.starts_with("from ") && line.contains(" import "))
        || line.starts_with("use ")
        || line.starts_with("package ")
        || line.starts_with("require ")
        || line.starts_with("require(")
        || line.starts_with("require_relative ")
        || line.starts_with("#include")
        || (line.starts_with("using ") && line.ends_with(';'))
        || ((line.starts_with("const ") || line.starts_with("let ") || line.starts_with("var "))
            && line.contains("require("))
}

/// Rename a redefined test class so it does not shadow the existing one
fn rename_taken_containers(language: Language, block: &str, taken: &mut BTreeSet<String>) -> String {
    let mut out = block.to_string();
    for name in extract_test_containers(language, block) {
        if !taken.contains(&name) {
            taken.insert(name);
            continue;
        }
        let mut suffix = 1;
        let fresh = loop {
            let candidate = if suffix == 1 {
                format!("{name}Generated")
            } else {
                format!("{name}Generated{suffix}")
            };
            if !taken.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        let pattern = format!(r"(?m)^([ \t]*(?:\w+[ \t]+)*?)class[ \t]+{}\b", regex::escape(&name));
        if let Ok(re) = Regex::new(&pattern) {
            out = re
                .replace_all(&out, format!("${{1}}class {fresh}").as_str())
                .into_owned();
        }
        taken.insert(fresh);
    }
    out
}

/// Lines of context around each hunk
const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffOp<'a> {
    Keep(&'a str),
    Remove(&'a str),
    Add(&'a str),
}

/// Unified diff between the previous artifact and the merged content
pub fn diff_summary(test_file: &str, existing: Option<&str>, merged: &str) -> DiffSummary {
    let old: Vec<&str> = existing.map(|e| e.lines().collect()).unwrap_or_default();
    let new: Vec<&str> = merged.lines().collect();
    let ops = edit_script(&old, &new);

    let mut patch = String::new();
    let old_label = if existing.is_some() {
        format!("a/{test_file}")
    } else {
        "/dev/null".to_string()
    };
    let _ = writeln!(patch, "--- {old_label}");
    let _ = writeln!(patch, "+++ b/{test_file}");
    write_hunks(&mut patch, &ops);

    DiffSummary {
        lines_added: ops.iter().filter(|op| matches!(op, DiffOp::Add(_))).count(),
        lines_removed: ops.iter().filter(|op| matches!(op, DiffOp::Remove(_))).count(),
        patch,
    }
}

/// Merges insert lines, so `new` normally contains `old` as a subsequence.
/// When it does not, the differing middle is replaced as a whole.
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<DiffOp<'a>> {
    let mut ops = Vec::with_capacity(new.len());
    let mut matched = 0;
    for &line in new {
        if old.get(matched) == Some(&line) {
            ops.push(DiffOp::Keep(line));
            matched += 1;
        } else {
            ops.push(DiffOp::Add(line));
        }
    }
    if matched == old.len() {
        return ops;
    }

    let common = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[common..]
        .iter()
        .rev()
        .zip(new[common..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let mut ops = Vec::with_capacity(old.len() + new.len());
    ops.extend(old[..common].iter().map(|&l| DiffOp::Keep(l)));
    ops.extend(old[common..old.len() - suffix].iter().map(|&l| DiffOp::Remove(l)));
    ops.extend(new[common..new.len() - suffix].iter().map(|&l| DiffOp::Add(l)));
    ops.extend(old[old.len() - suffix..].iter().map(|&l| DiffOp::Keep(l)));
    ops
}

fn write_hunks(patch: &mut String, ops: &[DiffOp<'_>]) {
    // line numbers before each op, zero-based
    let mut positions = Vec::with_capacity(ops.len() + 1);
    let (mut old_no, mut new_no) = (0, 0);
    for op in ops {
        positions.push((old_no, new_no));
        match op {
            DiffOp::Keep(_) => {
                old_no += 1;
                new_no += 1;
            }
            DiffOp::Remove(_) => old_no += 1,
            DiffOp::Add(_) => new_no += 1,
        }
    }

    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, DiffOp::Keep(_)))
        .map(|(i, _)| i)
        .collect();

    let mut k = 0;
    while k < changes.len() {
        let first = changes[k];
        let mut last = first;
        k += 1;
        while k < changes.len() && changes[k] - last <= 2 * CONTEXT + 1 {
            last = changes[k];
            k += 1;
        }

        let from = first.saturating_sub(CONTEXT);
        let to = (last + CONTEXT + 1).min(ops.len());
        let hunk = &ops[from..to];
        let (old_start, new_start) = positions[from];
        let old_count = hunk.iter().filter(|op| !matches!(op, DiffOp::Add(_))).count();
        let new_count = hunk.iter().filter(|op| !matches!(op, DiffOp::Remove(_))).count();
        let old_start = if old_count == 0 { old_start } else { old_start + 1 };
        let new_start = if new_count == 0 { new_start } else { new_start + 1 };

        let _ = writeln!(patch, "@@ -{old_start},{old_count} +{new_start},{new_count} @@");
        for op in hunk {
            let _ = match op {
                DiffOp::Keep(line) => writeln!(patch, " {line}"),
                DiffOp::Remove(line) => writeln!(patch, "-{line}"),
                DiffOp::Add(line) => writeln!(patch, "+{line}"),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CandidateFile, ValidationStatus};

    const EXISTING: &str = "import pytest\nfrom app.calc import add\n\n\ndef test_add():\n    assert add(1, 2) == 3\n";

    const GENERATED: &str = "import pytest\nfrom app.calc import add, sub\n\n\ndef test_add():\n    assert add(1, 2) == 3\n\n\n@pytest.mark.parametrize(\"a\", [1, 2])\ndef test_sub(a):\n    assert sub(a, a) == 0\n";

    fn valid_result(code: &str) -> GenerationResult {
        GenerationResult {
            candidate: CandidateFile {
                path: "app/calc.py".to_string(),
                coverage_pct: 20.0,
                language: Language::Python,
                rank: 1,
            },
            raw_model_text: format!("```python\n{code}```"),
            extracted_code: Some(code.to_string()),
            validation_status: ValidationStatus::Valid,
            test_names: extract_test_names(Language::Python, code),
        }
    }

    #[test]
    fn test_python_segments_keep_decorators() {
        let blocks = segment(Language::Python, GENERATED);
        assert_eq!(blocks.len(), 4);
        assert!(blocks[3].starts_with("@pytest.mark.parametrize"));
        assert!(blocks[3].contains("def test_sub(a):"));
    }

    #[test]
    fn test_braced_segments() {
        let code = "import { add } from './calc';\n\ndescribe('add', () => {\n  it('adds', () => {\n    expect(add(1, 2)).toBe(3);\n  });\n});\n\ntest('zero', () => {\n  expect(add(0, 0)).toBe(0);\n});\n";
        let blocks = segment(Language::JavaScript, code);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].starts_with("describe('add'"));
        assert!(blocks[2].starts_with("test('zero'"));
    }

    #[test]
    fn test_go_import_group_is_one_block() {
        let code = "package calc\n\nimport (\n\t\"testing\"\n)\n\nfunc TestAdd(t *testing.T) {\n\tif Add(1, 2) != 3 {\n\t\tt.Fatal(\"bad\")\n\t}\n}\n";
        let blocks = segment(Language::Go, code);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].starts_with("import ("));
    }

    #[test]
    fn test_annotations_attach_to_method() {
        let code = "#[test]\nfn adds() {\n    assert_eq!(add(1, 2), 3);\n}\n";
        assert_eq!(segment(Language::Rust, code).len(), 1);
    }

    #[test]
    fn test_merge_skips_existing_tests_and_imports() {
        let plan = plan_merge(Language::Python, "tests/test_calc.py", Some(EXISTING), GENERATED).unwrap();

        assert_eq!(plan.tests_added, BTreeSet::from(["test_sub".to_string()]));
        // the new import joins the import section instead of trailing the tests
        assert!(plan
            .content
            .starts_with("import pytest\nfrom app.calc import add\nfrom app.calc import add, sub\n\n\ndef test_add():"));
        assert_eq!(plan.content.matches("def test_add").count(), 1);
        assert_eq!(plan.content.matches("import pytest").count(), 1);
        assert!(plan.content.contains("from app.calc import add, sub"));
        assert!(plan.content.ends_with("assert sub(a, a) == 0\n"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let first = plan_merge(Language::Python, "tests/test_calc.py", Some(EXISTING), GENERATED).unwrap();
        assert!(plan_merge(Language::Python, "tests/test_calc.py", Some(&first.content), GENERATED).is_none());
    }

    #[test]
    fn test_merge_into_missing_artifact() {
        let plan = plan_merge(Language::Python, "tests/test_calc.py", None, GENERATED).unwrap();
        assert_eq!(plan.tests_added.len(), 2);
        assert!(plan.content.starts_with("import pytest\n"));
        assert!(plan.diff.patch.starts_with("--- /dev/null\n+++ b/tests/test_calc.py\n@@ -0,0 +1,"));
        assert_eq!(plan.diff.lines_removed, 0);
        assert_eq!(plan.diff.lines_added, plan.content.lines().count());
    }

    #[test]
    fn test_helpers_alone_are_not_new_tests() {
        let generated = "def make_calc():\n    return object()\n";
        assert!(plan_merge(Language::Python, "tests/test_calc.py", Some(EXISTING), generated).is_none());
    }

    #[test]
    fn test_colliding_test_class_is_renamed() {
        let existing = "class TestCalc:\n    def test_add(self):\n        pass\n";
        let generated = "class TestCalc:\n    def test_mul(self):\n        pass\n";
        let plan = plan_merge(Language::Python, "tests/test_calc.py", Some(existing), generated).unwrap();
        assert!(plan.content.contains("class TestCalc:\n"));
        assert!(plan.content.contains("class TestCalcGenerated:\n"));
    }

    #[test]
    fn test_python_class_drops_methods_already_present() {
        let existing = "def test_add():\n    pass\n";
        let generated = "class TestCalc:\n    def test_add(self):\n        pass\n\n    def test_sub(self):\n        pass\n";
        let plan = plan_merge(Language::Python, "tests/test_calc.py", Some(existing), generated).unwrap();

        assert_eq!(plan.tests_added, BTreeSet::from(["test_sub".to_string()]));
        assert_eq!(plan.content.matches("def test_add").count(), 1);
        assert!(plan.content.ends_with("class TestCalc:\n    def test_sub(self):\n        pass\n"));
    }

    const GO_EXISTING: &str = "package calc\n\nimport (\n\t\"testing\"\n)\n\nfunc TestAdd(t *testing.T) {\n\tif Add(1, 2) != 3 {\n\t\tt.Fatal(\"bad\")\n\t}\n}\n";

    #[test]
    fn test_go_import_group_gains_only_new_entries() {
        let generated = "package calc\n\nimport (\n\t\"errors\"\n\t\"testing\"\n)\n\nfunc TestSub(t *testing.T) {\n\tif Sub(2, 1) != 1 {\n\t\tt.Fatal(errors.New(\"bad\"))\n\t}\n}\n";
        let plan = plan_merge(Language::Go, "calc_test.go", Some(GO_EXISTING), generated).unwrap();

        assert_eq!(plan.tests_added, BTreeSet::from(["TestSub".to_string()]));
        assert_eq!(
            plan.content,
            "package calc\n\nimport (\n\t\"testing\"\n\t\"errors\"\n)\n\nfunc TestAdd(t *testing.T) {\n\tif Add(1, 2) != 3 {\n\t\tt.Fatal(\"bad\")\n\t}\n}\n\nfunc TestSub(t *testing.T) {\n\tif Sub(2, 1) != 1 {\n\t\tt.Fatal(errors.New(\"bad\"))\n\t}\n}\n"
        );
        assert_eq!(plan.diff.lines_removed, 0);
        assert!(plan.diff.patch.contains("\t\"testing\"\n+\t\"errors\"\n )\n"));
        assert!(plan_merge(Language::Go, "calc_test.go", Some(&plan.content), generated).is_none());
    }

    #[test]
    fn test_go_import_group_already_present_is_dropped_whole() {
        let generated = "import (\n\t\"testing\"\n)\n\nfunc TestSub(t *testing.T) {\n\tt.Log(Sub(2, 1))\n}\n";
        let plan = plan_merge(Language::Go, "calc_test.go", Some(GO_EXISTING), generated).unwrap();

        assert_eq!(plan.content.matches("import (").count(), 1);
        assert_eq!(plan.content.lines().filter(|l| *l == ")").count(), 1);
        assert!(plan.content.starts_with(GO_EXISTING.trim_end()));
        assert!(plan.content.ends_with("\n\nfunc TestSub(t *testing.T) {\n\tt.Log(Sub(2, 1))\n}\n"));
    }

    #[test]
    fn test_go_import_group_into_file_with_single_imports() {
        let existing = "package calc\n\nimport \"testing\"\n\nfunc TestAdd(t *testing.T) {}\n";
        let generated = "import (\n\t\"errors\"\n\t\"testing\"\n)\n\nfunc TestSub(t *testing.T) {\n\t_ = errors.New(\"x\")\n}\n";
        let plan = plan_merge(Language::Go, "calc_test.go", Some(existing), generated).unwrap();

        assert!(plan
            .content
            .starts_with("package calc\n\nimport \"testing\"\nimport (\n\t\"errors\"\n)\n\nfunc TestAdd"));
        assert!(!plan.content.contains("import (\n\t\"errors\"\n\t\"testing\""));
    }

    const JAVA_EXISTING: &str = "package calc;\n\nimport org.junit.jupiter.api.Test;\n\nclass CalcTest {\n    @Test\n    void adds() {\n        assertEquals(3, Calc.add(1, 2));\n    }\n}\n";

    #[test]
    fn test_java_class_with_existing_test_folds_new_methods() {
        let generated = "package calc;\n\nimport org.junit.jupiter.api.Test;\nimport static org.junit.jupiter.api.Assertions.assertEquals;\n\nclass CalcTest {\n    @Test\n    void adds() {\n        assertEquals(3, Calc.add(1, 2));\n    }\n\n    @Test\n    void subs() {\n        assertEquals(1, Calc.sub(2, 1));\n    }\n}\n";
        let plan = plan_merge(Language::Java, "CalcTest.java", Some(JAVA_EXISTING), generated).unwrap();

        assert_eq!(plan.tests_added, BTreeSet::from(["subs".to_string()]));
        assert_eq!(
            plan.content,
            "package calc;\n\nimport org.junit.jupiter.api.Test;\nimport static org.junit.jupiter.api.Assertions.assertEquals;\n\nclass CalcTest {\n    @Test\n    void adds() {\n        assertEquals(3, Calc.add(1, 2));\n    }\n\n    @Test\n    void subs() {\n        assertEquals(1, Calc.sub(2, 1));\n    }\n}\n"
        );
        assert_eq!(plan.diff.lines_removed, 0);
        assert!(plan
            .diff
            .patch
            .contains("+import static org.junit.jupiter.api.Assertions.assertEquals;\n"));
        assert!(plan_merge(Language::Java, "CalcTest.java", Some(&plan.content), generated).is_none());
    }

    #[test]
    fn test_java_single_line_class_receives_new_methods() {
        let existing = "class CalcTest { @Test void adds() {} }\n";
        let generated = "class CalcTest {\n    @Test\n    void adds() {}\n\n    @Test\n    void subs() {}\n}\n";
        let plan = plan_merge(Language::Java, "CalcTest.java", Some(existing), generated).unwrap();

        assert_eq!(plan.content, "class CalcTest { @Test void adds() {}\n\n    @Test\n    void subs() {}\n}\n");
        assert_eq!(plan.content.matches("class CalcTest").count(), 1);
        assert_eq!(plan.content.matches("void adds()").count(), 1);
    }

    #[test]
    fn test_java_setup_already_in_class_is_not_repeated() {
        let existing = "class CalcTest {\n    @BeforeEach\n    void setUp() {\n        calc = new Calc();\n    }\n\n    @Test\n    void adds() {}\n}\n";
        let generated = "class CalcTest {\n    @BeforeEach\n    void setUp() {\n        calc = new Calc();\n    }\n\n    @Test\n    void divides() {}\n}\n";
        let plan = plan_merge(Language::Java, "CalcTest.java", Some(existing), generated).unwrap();

        assert_eq!(plan.content.matches("void setUp()").count(), 1);
        assert_eq!(plan.content.matches("class CalcTest").count(), 1);
        assert!(plan.content.ends_with("    void adds() {}\n\n    @Test\n    void divides() {}\n}\n"));
    }

    #[test]
    fn test_unsplittable_java_class_is_renamed() {
        let existing = "class CalcTest {\n    @Test\n    void adds() {}\n}\n";
        let generated = "public class CalcTest { @Test void subs() {} }\n";
        let plan = plan_merge(Language::Java, "CalcTest.java", Some(existing), generated).unwrap();

        assert!(plan.content.contains("public class CalcTestGenerated { @Test void subs() {} }"));
        assert_eq!(plan.content.matches("class CalcTest {").count(), 1);
    }

    #[test]
    fn test_js_describe_drops_cases_already_present() {
        let existing = "const { add, sub } = require('./calc');\n\ndescribe('calc', () => {\n  it('adds', () => {\n    expect(add(1, 2)).toBe(3);\n  });\n});\n";
        let generated = "const { add, sub } = require('./calc');\n\ndescribe('calc', () => {\n  it('adds', () => {\n    expect(add(1, 2)).toBe(3);\n  });\n\n  it('subs', () => {\n    expect(sub(2, 1)).toBe(1);\n  });\n});\n";
        let plan = plan_merge(Language::JavaScript, "calc.test.js", Some(existing), generated).unwrap();

        assert_eq!(plan.tests_added, BTreeSet::from(["subs".to_string()]));
        assert_eq!(plan.content.matches("it('adds'").count(), 1);
        assert_eq!(plan.content.matches("require('./calc')").count(), 1);
        assert!(plan.content.ends_with(
            "});\n\ndescribe('calc', () => {\n  it('subs', () => {\n    expect(sub(2, 1)).toBe(1);\n  });\n});\n"
        ));
        assert!(plan_merge(Language::JavaScript, "calc.test.js", Some(&plan.content), generated).is_none());
    }

    #[test]
    fn test_rust_module_folds_into_existing_module() {
        let existing = "#[cfg(test)]\nmod tests {\n    use super::*;\n\n    #[test]\n    fn adds() {\n        assert_eq!(add(1, 2), 3);\n    }\n}\n";
        let generated = "#[cfg(test)]\nmod tests {\n    use super::*;\n\n    #[test]\n    fn adds() {\n        assert_eq!(add(1, 2), 3);\n    }\n\n    #[test]\n    fn subs() {\n        assert_eq!(sub(2, 1), 1);\n    }\n}\n";
        let plan = plan_merge(Language::Rust, "src/calc.rs", Some(existing), generated).unwrap();

        assert_eq!(plan.content.matches("mod tests").count(), 1);
        assert_eq!(plan.content.matches("use super::*;").count(), 1);
        assert_eq!(plan.content.matches("fn adds()").count(), 1);
        assert!(plan.content.ends_with("    #[test]\n    fn subs() {\n        assert_eq!(sub(2, 1), 1);\n    }\n}\n"));
    }

    #[test]
    fn test_imports_hoisted_above_code_without_imports() {
        let existing = "class CalcTest {\n    @Test\n    void adds() {}\n}\n";
        let generated = "import org.junit.jupiter.api.Test;\n\nclass CalcTest {\n    @Test\n    void subs() {}\n}\n";
        let plan = plan_merge(Language::Java, "CalcTest.java", Some(existing), generated).unwrap();

        assert!(plan.content.starts_with("import org.junit.jupiter.api.Test;\n\nclass CalcTest {\n"));
    }

    #[test]
    fn test_import_group_identity() {
        assert_eq!(group_id("import (", ")"), "import");
        assert_eq!(group_id("from app.calc import (", ")"), "from app.calc import");
        assert_eq!(group_id("import {", "} from './calc';"), "import from './calc';");
        assert_eq!(entry_key("import", "\t\"testing\""), Some("import \"testing\"".to_string()));
        assert_eq!(entry_key("from a import", "    b,"), Some("from a import b".to_string()));
        assert_eq!(entry_key("import", "   "), None);
    }

    #[test]
    fn test_python_import_group_entries_match_single_imports() {
        let existing = "from app.calc import add\n\n\ndef test_add():\n    pass\n";
        let generated = "from app.calc import (\n    add,\n    sub,\n)\n\n\ndef test_sub():\n    pass\n";
        let plan = plan_merge(Language::Python, "tests/test_calc.py", Some(existing), generated).unwrap();

        assert!(plan.content.starts_with("from app.calc import add\nfrom app.calc import (\n    sub,\n)\n"));
        assert!(!plan.content.contains("    add,\n"));
    }

    #[test]
    fn test_container_scan_finds_closing_braces() {
        let lines = [
            "namespace App.Tests",
            "{",
            "    public class CalcTests {",
            "        [Fact] public void Adds() {}",
            "    }",
            "}",
            "class Inline { void x() {} }",
        ];
        let found = scan_containers(&lines);
        assert_eq!(found["App"], Anchor { line: 5, offset: None });
        assert_eq!(found["CalcTests"], Anchor { line: 4, offset: None });
        assert_eq!(
            found["Inline"],
            Anchor {
                line: 6,
                offset: Some(27)
            }
        );
    }

    #[test]
    fn test_diff_hunks_split_on_distant_changes() {
        let old = "a\nb\nc\nd\ne\nf\ng\nh\ni\nj\nk\n}\n";
        let new = "a\nnew import\nb\nc\nd\ne\nf\ng\nh\ni\nj\nk\nnew test\n}\n";
        let diff = diff_summary("t.java", Some(old), new);
        assert_eq!(diff.lines_added, 2);
        assert_eq!(diff.lines_removed, 0);
        assert!(diff.patch.contains("@@ -1,4 +1,5 @@\n a\n+new import\n b\n c\n d\n"));
        assert!(diff.patch.contains("@@ -9,4 +10,5 @@\n i\n j\n k\n+new test\n }\n"));
    }

    #[test]
    fn test_diff_of_rewritten_line_removes_and_adds() {
        let diff = diff_summary("t.java", Some("class A { x }\n"), "class A { x\n  y\n}\n");
        assert_eq!(diff.lines_removed, 1);
        assert_eq!(diff.lines_added, 3);
        assert!(diff.patch.contains("@@ -1,1 +1,3 @@\n-class A { x }\n+class A { x\n+  y\n+}\n"));
    }

    #[test]
    fn test_diff_hunk_has_context() {
        let diff = diff_summary("t.py", Some("a\nb\nc\nd\n"), "a\nb\nc\nd\n\nx\n");
        assert_eq!(diff.lines_added, 2);
        assert_eq!(diff.lines_removed, 0);
        assert!(diff.patch.contains("@@ -2,3 +2,5 @@\n b\n c\n d\n+\n+x\n"));
    }

    #[test]
    fn test_import_like_lines() {
        assert!(is_import_like("import os"));
        assert!(is_import_like("from a import b"));
        assert!(is_import_like("use std::fs;"));
        assert!(is_import_like("#include <gtest/gtest.h>"));
        assert!(is_import_like("using Xunit;"));
        assert!(is_import_like("const calc = require('./calc');"));
        assert!(!is_import_like("    import os"));
        assert!(!is_import_like("from_value = 3"));
        assert!(!is_import_like("using (var s = Open())"));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("tests/test_calc.py");

        let decision = TestMerger::new(false)
            .merge(&valid_result(GENERATED), "tests/test_calc.py", &artifact, None)
            .await
            .unwrap();

        assert!(matches!(decision, MergeDecision::Merged { written: false, .. }));
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_apply_writes_then_second_merge_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("tests/test_calc.py");
        let merger = TestMerger::new(true);
        let result = valid_result(GENERATED);

        let existing = read_artifact(&artifact).await.unwrap();
        assert!(existing.is_none());
        let first = merger
            .merge(&result, "tests/test_calc.py", &artifact, existing.as_deref())
            .await
            .unwrap();
        assert!(matches!(first, MergeDecision::Merged { written: true, .. }));
        let written = read_artifact(&artifact).await.unwrap().unwrap();
        assert!(written.ends_with('\n'));

        let second = merger
            .merge(&result, "tests/test_calc.py", &artifact, Some(&written))
            .await
            .unwrap();
        assert_eq!(second, MergeDecision::NothingNew);
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), written);
    }

    #[tokio::test]
    async fn test_invalid_result_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = valid_result(GENERATED);
        result.validation_status = ValidationStatus::SyntaxError;
        result.extracted_code = None;

        let err = TestMerger::new(true)
            .merge(&result, "tests/test_calc.py", &dir.path().join("t.py"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailure(ValidationStatus::SyntaxError)));
    }
}
