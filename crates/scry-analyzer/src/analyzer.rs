//! The analyzer capability shared by every language variant.
//!
//! An [`Analyzer`] turns one file into [`ExtractedChunk`]s: the chunk shape
//! plus the raw call sites found in its body. Call sites are resolved into
//! symbol references later, once the project-wide symbol table is known
//! (see [`crate::resolve`]).

use scry_core::{ChunkKind, LineRange, ScryError};
use tree_sitter::{Node, Parser, Tree};

use crate::language::Language;

/// A call expression as it appears in source, before resolution.
///
/// # Examples
///
/// ```
/// use scry_analyzer::CallSite;
///
/// let site = CallSite::SelfMember("recalculate".into());
/// assert_eq!(site.member(), "recalculate");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSite {
    /// `name()`
    Bare(String),
    /// `this.member()` / `self.member()` / `Self::member()`
    SelfMember(String),
    /// `Receiver.member()` / `Receiver::member()` with a plain identifier receiver.
    Qualified { receiver: String, member: String },
    /// `<expression>.member()` where the receiver type is unknown.
    Member(String),
}

impl CallSite {
    /// The invoked name, without its receiver.
    pub fn member(&self) -> &str {
        match self {
            CallSite::Bare(name) | CallSite::SelfMember(name) | CallSite::Member(name) => name,
            CallSite::Qualified { member, .. } => member,
        }
    }
}

/// A chunk as extracted from one file, with unresolved call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedChunk {
    pub symbol: String,
    pub kind: ChunkKind,
    pub line_range: LineRange,
    pub content: String,
    /// Enclosing class (or impl type) for methods.
    pub scope: Option<String>,
    /// Calls in body order.
    pub call_sites: Vec<CallSite>,
}

/// Polymorphic source analyzer: one implementation per language family,
/// all producing the same chunk shape.
pub trait Analyzer: Send + Sync {
    /// The language this analyzer was built for.
    fn language(&self) -> Language;

    /// Extract chunks from `source`. Output order follows source order, and
    /// identical input always yields identical output.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Parse`] when the grammar cannot be loaded or the
    /// source contains syntax errors.
    fn extract(&self, source: &str) -> Result<Vec<ExtractedChunk>, ScryError>;
}

/// Parse `source` with the grammar for `language`, rejecting trees that
/// contain syntax errors.
pub(crate) fn parse_source(language: Language, source: &str) -> Result<Tree, ScryError> {
    let Some(ts_language) = language.tree_sitter_language() else {
        return Err(ScryError::Parse(format!("no grammar for {language:?}")));
    };

    let mut parser = Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|e| ScryError::Parse(format!("failed to set language: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ScryError::Parse("parser produced no tree".into()))?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(root.start_position().row as u32 + 1);
        return Err(ScryError::Parse(format!("syntax error near line {line}")));
    }

    Ok(tree)
}

fn first_error_line(node: Node) -> Option<u32> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row as u32 + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

pub(crate) fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

pub(crate) fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(&child, source))
        .filter(|text| !text.is_empty())
}

pub(crate) fn line_range(node: &Node) -> LineRange {
    LineRange::new(
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

/// Whether `node` or any descendant has one of `kinds`.
pub(crate) fn contains_kind(node: &Node, kinds: &[&str]) -> bool {
    if kinds.contains(&node.kind()) {
        return true;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if contains_kind(&child, kinds) {
            return true;
        }
    }
    false
}

/// Collect call sites below `node` in pre-order using a language-specific
/// classifier for call nodes.
pub(crate) fn collect_calls<F>(node: &Node, classify: &F, out: &mut Vec<CallSite>)
where
    F: Fn(&Node) -> Option<CallSite>,
{
    if let Some(site) = classify(node) {
        out.push(site);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(&child, classify, out);
    }
}

/// True when the first character is an uppercase letter.
pub(crate) fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}
