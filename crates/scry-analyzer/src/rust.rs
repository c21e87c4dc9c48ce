//! Rust analyzer.
//!
//! Free functions become `function` chunks and methods in `impl` blocks
//! become `Type.method`. Rust has no top-level closure bindings, so the
//! closure rule never fires here.

use scry_core::{ChunkKind, ScryError};
use tree_sitter::Node;

use crate::analyzer::{
    collect_calls, field_text, line_range, node_text, parse_source, Analyzer, CallSite,
    ExtractedChunk,
};
use crate::language::Language;

/// Analyzer for Rust sources.
///
/// # Examples
///
/// ```
/// use scry_analyzer::{Analyzer, RustAnalyzer};
///
/// let chunks = RustAnalyzer.extract("fn hello() { println!(\"hi\"); }").unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].symbol, "hello");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RustAnalyzer;

impl Analyzer for RustAnalyzer {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn extract(&self, source: &str) -> Result<Vec<ExtractedChunk>, ScryError> {
        let tree = parse_source(Language::Rust, source)?;
        let bytes = source.as_bytes();
        let mut chunks = Vec::new();

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "function_item" => {
                    if let Some(name) = field_text(&child, "name", bytes) {
                        chunks.push(make_chunk(&child, bytes, name, ChunkKind::Function, None));
                    }
                }
                "impl_item" => collect_impl(child, bytes, &mut chunks),
                _ => {}
            }
        }

        Ok(chunks)
    }
}

fn impl_type_name(node: &Node, source: &[u8]) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    match ty.kind() {
        "generic_type" => field_text(&ty, "type", source),
        "scoped_type_identifier" => field_text(&ty, "name", source),
        _ => Some(node_text(&ty, source)).filter(|t| !t.is_empty()),
    }
}

fn collect_impl(node: Node, source: &[u8], chunks: &mut Vec<ExtractedChunk>) {
    let Some(type_name) = impl_type_name(&node, source) else {
        return;
    };
    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for item in body.named_children(&mut cursor) {
        if item.kind() != "function_item" {
            continue;
        }
        if let Some(name) = field_text(&item, "name", source) {
            chunks.push(make_chunk(
                &item,
                source,
                format!("{type_name}.{name}"),
                ChunkKind::ClassMethod,
                Some(&type_name),
            ));
        }
    }
}

fn make_chunk(
    node: &Node,
    source: &[u8],
    symbol: String,
    kind: ChunkKind,
    scope: Option<&str>,
) -> ExtractedChunk {
    let mut call_sites = Vec::new();
    collect_calls(node, &|n: &Node| classify_call(n, source), &mut call_sites);

    ExtractedChunk {
        symbol,
        kind,
        line_range: line_range(node),
        content: node_text(node, source),
        scope: scope.map(str::to_string),
        call_sites,
    }
}

fn classify_call(node: &Node, source: &[u8]) -> Option<CallSite> {
    if node.kind() != "call_expression" {
        return None;
    }
    let mut callee = node.child_by_field_name("function")?;
    if callee.kind() == "generic_function" {
        callee = callee.child_by_field_name("function")?;
    }
    match callee.kind() {
        "identifier" => Some(CallSite::Bare(node_text(&callee, source))),
        "scoped_identifier" => {
            let member = field_text(&callee, "name", source)?;
            let path = callee.child_by_field_name("path");
            match path {
                Some(p) if node_text(&p, source) == "Self" => Some(CallSite::SelfMember(member)),
                Some(p) if matches!(p.kind(), "identifier" | "type_identifier") => {
                    Some(CallSite::Qualified {
                        receiver: node_text(&p, source),
                        member,
                    })
                }
                Some(p) if p.kind() == "scoped_identifier" => Some(CallSite::Qualified {
                    receiver: field_text(&p, "name", source)?,
                    member,
                }),
                _ => Some(CallSite::Member(member)),
            }
        }
        "field_expression" => {
            let member = field_text(&callee, "field", source)?;
            let value = callee.child_by_field_name("value")?;
            if value.kind() == "self" {
                Some(CallSite::SelfMember(member))
            } else {
                Some(CallSite::Member(member))
            }
        }
        _ => None,
    }
}
