//! Python analyzer.
//!
//! Module-level `def`s become functions, methods of module-level classes
//! become `Class.method`, and module-level `name = lambda ...` bindings
//! become functions named after the variable.

use scry_core::{ChunkKind, ScryError};
use tree_sitter::Node;

use crate::analyzer::{
    collect_calls, field_text, line_range, node_text, parse_source, Analyzer, CallSite,
    ExtractedChunk,
};
use crate::language::Language;

/// Analyzer for Python sources.
///
/// # Examples
///
/// ```
/// use scry_analyzer::{Analyzer, PythonAnalyzer};
///
/// let chunks = PythonAnalyzer.extract("class Cart:\n    def total(self):\n        return 0\n").unwrap();
/// assert_eq!(chunks[0].symbol, "Cart.total");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PythonAnalyzer;

impl Analyzer for PythonAnalyzer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract(&self, source: &str) -> Result<Vec<ExtractedChunk>, ScryError> {
        let tree = parse_source(Language::Python, source)?;
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

/// Unwrap a `decorated_definition` to the definition it decorates, keeping
/// the outer node as the unit so decorators stay part of the content.
fn definition_of(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        if let Some(def) = node.child_by_field_name("definition") {
            return def;
        }
    }
    node
}

fn collect_top_level(unit: Node, source: &[u8], chunks: &mut Vec<ExtractedChunk>) {
    let def = definition_of(unit);
    match def.kind() {
        "function_definition" => {
            if let Some(name) = field_text(&def, "name", source) {
                chunks.push(make_chunk(&unit, source, name, ChunkKind::Function, None));
            }
        }
        "class_definition" => {
            let Some(class_name) = field_text(&def, "name", source) else {
                return;
            };
            let Some(body) = def.child_by_field_name("body") else {
                return;
            };
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                let method = definition_of(member);
                if method.kind() != "function_definition" {
                    continue;
                }
                if let Some(name) = field_text(&method, "name", source) {
                    chunks.push(make_chunk(
                        &member,
                        source,
                        format!("{class_name}.{name}"),
                        ChunkKind::ClassMethod,
                        Some(&class_name),
                    ));
                }
            }
        }
        "expression_statement" => {
            let Some(assignment) = def.named_child(0) else {
                return;
            };
            if assignment.kind() != "assignment" {
                return;
            }
            let (Some(left), Some(right)) = (
                assignment.child_by_field_name("left"),
                assignment.child_by_field_name("right"),
            ) else {
                return;
            };
            if left.kind() == "identifier" && right.kind() == "lambda" {
                let name = node_text(&left, source);
                chunks.push(make_chunk(&unit, source, name, ChunkKind::Function, None));
            }
        }
        _ => {}
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
    if node.kind() != "call" {
        return None;
    }
    let callee = node.child_by_field_name("function")?;
    match callee.kind() {
        "identifier" => Some(CallSite::Bare(node_text(&callee, source))),
        "attribute" => {
            let member = field_text(&callee, "attribute", source)?;
            let object = callee.child_by_field_name("object")?;
            if object.kind() != "identifier" {
                return Some(CallSite::Member(member));
            }
            let receiver = node_text(&object, source);
            if receiver == "self" || receiver == "cls" {
                Some(CallSite::SelfMember(member))
            } else {
                Some(CallSite::Qualified { receiver, member })
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_python_units() {
        let source = r#"
import logging

def show_toast(msg):
    render(msg)

class Cart:
    @property
    def total(self):
        return self.compute()

    def compute(self):
        return sum(self.items)

format_date = lambda d: d.isoformat()
MAX_ITEMS = 10
"#;
        let chunks = PythonAnalyzer.extract(source).unwrap();
        let symbols: Vec<&str> = chunks.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            vec!["show_toast", "Cart.total", "Cart.compute", "format_date"]
        );

        let total = &chunks[1];
        assert_eq!(total.kind, ChunkKind::ClassMethod);
        assert!(total.content.starts_with("@property"));
        assert_eq!(
            total.call_sites,
            vec![CallSite::SelfMember("compute".into())]
        );
        assert_eq!(chunks[3].kind, ChunkKind::Function);
    }

    #[test]
    fn uppercase_lambda_is_still_a_function() {
        let chunks = PythonAnalyzer.extract("Render = lambda: None\n").unwrap();
        assert_eq!(chunks[0].kind, ChunkKind::Function);
    }

    #[test]
    fn qualified_calls_are_classified() {
        let source = "def boot():\n    Config.load()\n    app.db.connect()\n";
        let chunks = PythonAnalyzer.extract(source).unwrap();
        assert_eq!(
            chunks[0].call_sites,
            vec![
                CallSite::Qualified {
                    receiver: "Config".into(),
                    member: "load".into()
                },
                CallSite::Member("connect".into()),
            ]
        );
    }
}
