//! JavaScript / TypeScript analyzer (JSX and TSX included).
//!
//! Extracts class methods, top-level function declarations, and top-level
//! variables bound to arrow functions or function expressions. A bound
//! closure becomes a `component` when its name is capitalized and its body
//! renders at least one JSX element.

use scry_core::{ChunkKind, ScryError};
use tree_sitter::Node;

use crate::analyzer::{
    collect_calls, contains_kind, field_text, line_range, node_text, parse_source,
    starts_uppercase, Analyzer, CallSite, ExtractedChunk,
};
use crate::language::Language;

const CLOSURE_KINDS: &[&str] = &["arrow_function", "function_expression", "function"];
const MARKUP_KINDS: &[&str] = &["jsx_element", "jsx_self_closing_element"];

/// Analyzer for the ECMAScript family.
///
/// # Examples
///
/// ```
/// use scry_analyzer::{Analyzer, EcmaAnalyzer, Language};
/// use scry_core::ChunkKind;
///
/// let analyzer = EcmaAnalyzer::new(Language::JavaScript);
/// let chunks = analyzer.extract("function showToast(msg) { notify(msg); }").unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].symbol, "showToast");
/// assert_eq!(chunks[0].kind, ChunkKind::Function);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EcmaAnalyzer {
    language: Language,
}

impl EcmaAnalyzer {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl Analyzer for EcmaAnalyzer {
    fn language(&self) -> Language {
        self.language
    }

    fn extract(&self, source: &str) -> Result<Vec<ExtractedChunk>, ScryError> {
        let tree = parse_source(self.language, source)?;
        let bytes = source.as_bytes();
        let mut chunks = Vec::new();

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            collect_top_level(child, bytes, &mut chunks);
        }

        Ok(chunks)
    }
}

fn collect_top_level(node: Node, source: &[u8], chunks: &mut Vec<ExtractedChunk>) {
    match node.kind() {
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                collect_top_level(decl, source, chunks);
            } else if let Some(value) = node.child_by_field_name("value") {
                // `export default class Foo {}` / `export default function foo() {}`
                // may surface as named expressions.
                if matches!(value.kind(), "class" | "function_expression") {
                    collect_top_level(value, source, chunks);
                }
            }
        }
        "function_declaration" | "generator_function_declaration" | "function_expression" => {
            if let Some(name) = field_text(&node, "name", source) {
                chunks.push(make_chunk(&node, source, name, ChunkKind::Function, None));
            }
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            if let Some(class_name) = field_text(&node, "name", source) {
                if let Some(body) = node.child_by_field_name("body") {
                    collect_class_members(body, source, &class_name, chunks);
                }
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarators: Vec<Node> = node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator")
                .collect();
            for declarator in &declarators {
                let Some(name_node) = declarator.child_by_field_name("name") else {
                    continue;
                };
                // Destructuring patterns are not named units.
                if name_node.kind() != "identifier" {
                    continue;
                }
                let Some(value) = declarator.child_by_field_name("value") else {
                    continue;
                };
                let Some(callable) = callable_value(value) else {
                    continue;
                };
                let name = node_text(&name_node, source);
                let kind = if starts_uppercase(&name) && contains_kind(&callable, MARKUP_KINDS) {
                    ChunkKind::Component
                } else {
                    ChunkKind::Function
                };
                // A single declarator owns the whole declaration text.
                let unit = if declarators.len() == 1 {
                    node
                } else {
                    *declarator
                };
                chunks.push(make_chunk(&unit, source, name, kind, None));
            }
        }
        _ => {}
    }
}

/// The closure bound by a declarator value, unwrapping one level of
/// higher-order wrapping such as `memo(() => ...)` or `forwardRef(...)`.
fn callable_value(value: Node) -> Option<Node> {
    if CLOSURE_KINDS.contains(&value.kind()) {
        return Some(value);
    }
    if value.kind() == "parenthesized_expression" {
        let inner = value.named_child(0)?;
        return callable_value(inner);
    }
    if value.kind() == "call_expression" {
        let args = value.child_by_field_name("arguments")?;
        let first = args.named_child(0)?;
        if CLOSURE_KINDS.contains(&first.kind()) {
            return Some(first);
        }
    }
    None
}

fn collect_class_members(
    body: Node,
    source: &[u8],
    class_name: &str,
    chunks: &mut Vec<ExtractedChunk>,
) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let name_node = match member.kind() {
            "method_definition" => member.child_by_field_name("name"),
            "field_definition" => member.child_by_field_name("property"),
            "public_field_definition" => member.child_by_field_name("name"),
            _ => None,
        };
        let Some(name_node) = name_node else {
            continue;
        };
        if !matches!(
            name_node.kind(),
            "property_identifier" | "private_property_identifier"
        ) {
            // Computed and literal keys are anonymous for our purposes.
            continue;
        }
        if member.kind() != "method_definition" {
            let is_callable = member
                .child_by_field_name("value")
                .and_then(callable_value)
                .is_some();
            if !is_callable {
                continue;
            }
        }
        let symbol = format!("{class_name}.{}", node_text(&name_node, source));
        chunks.push(make_chunk(
            &member,
            source,
            symbol,
            ChunkKind::ClassMethod,
            Some(class_name),
        ));
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
    let callee = node.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some(CallSite::Bare(node_text(&callee, source))),
        "member_expression" => {
            let property = field_text(&callee, "property", source)?;
            let object = callee.child_by_field_name("object")?;
            match object.kind() {
                "this" => Some(CallSite::SelfMember(property)),
                "identifier" => Some(CallSite::Qualified {
                    receiver: node_text(&object, source),
                    member: property,
                }),
                _ => Some(CallSite::Member(property)),
            }
        }
        _ => None,
    }
}
