//! Source analysis: turning source files into [`Chunk`]s via tree-sitter.
//!
//! Each supported language family has its own [`Analyzer`] variant. All of
//! them produce the same chunk shape, so diffing, embedding, and querying
//! never need to know which language a chunk came from. Outbound calls are
//! resolved against a project-wide [`SymbolTable`] after extraction.

pub mod analyzer;
pub mod ecma;
pub mod language;
pub mod python;
pub mod resolve;
pub mod rust;
pub mod walker;

use std::collections::HashMap;

use scry_core::{Chunk, ChunkKind, LineRange, ScryError};

pub use analyzer::{Analyzer, CallSite, ExtractedChunk};
pub use ecma::EcmaAnalyzer;
pub use language::{is_dependency_path, Language};
pub use python::PythonAnalyzer;
pub use resolve::SymbolTable;
pub use rust::RustAnalyzer;

/// A `(relativePath, fullText)` pair handed to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    /// Full file content.
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: normalize_path(&path.into()),
            content: content.into(),
        }
    }
}

/// Result of analyzing a batch of files.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Chunks from every file that analyzed cleanly, in input order.
    pub chunks: Vec<Chunk>,
    /// Paths that were skipped because they failed to parse.
    pub failed: Vec<(String, ScryError)>,
}

/// Normalize a relative path to `/` separators without a leading `./`.
///
/// # Examples
///
/// ```
/// use scry_analyzer::normalize_path;
///
/// assert_eq!(normalize_path("./src\\ui\\toast.ts"), "src/ui/toast.ts");
/// ```
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Extract the raw (unresolved) chunks of one file.
///
/// Files in dependency trees and files in unsupported languages yield no
/// chunks. Chunks that share an identity key within the file (getter/setter
/// pairs, redefinitions) are merged into the first occurrence.
///
/// # Errors
///
/// Returns [`ScryError::Parse`] when the file does not parse cleanly.
pub fn extract_file(path: &str, content: &str) -> Result<Vec<ExtractedChunk>, ScryError> {
    if is_dependency_path(path) {
        return Ok(Vec::new());
    }
    let Some(analyzer) = Language::from_path(path).analyzer() else {
        return Ok(Vec::new());
    };
    let extracted = analyzer.extract(content)?;
    Ok(merge_duplicate_keys(extracted))
}

/// Analyze a batch of files, resolving calls across the whole batch plus
/// the declarations already in `known`.
///
/// A file that fails to parse is logged and skipped; the rest of the batch
/// still produces chunks.
///
/// # Examples
///
/// ```
/// use scry_analyzer::{analyze_sources, SourceFile, SymbolTable};
///
/// let files = vec![
///     SourceFile::new("ui/toast.js", "export function showToast(msg) { render(msg); }"),
///     SourceFile::new("ui/render.js", "export function render(x) { return x; }"),
///     SourceFile::new("broken.js", "function ( {"),
/// ];
/// let analysis = analyze_sources(&files, &SymbolTable::default());
/// assert_eq!(analysis.chunks.len(), 2);
/// assert_eq!(analysis.chunks[0].calls, vec!["render"]);
/// assert_eq!(analysis.failed.len(), 1);
/// ```
pub fn analyze_sources(files: &[SourceFile], known: &SymbolTable) -> Analysis {
    let mut table = known.clone();
    let mut extracted: Vec<(&SourceFile, Vec<ExtractedChunk>)> = Vec::new();
    let mut failed = Vec::new();

    for file in files {
        match extract_file(&file.path, &file.content) {
            Ok(chunks) => {
                for chunk in &chunks {
                    table.declare_kind(&chunk.symbol, chunk.kind);
                }
                extracted.push((file, chunks));
            }
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "skipping file that failed to analyze");
                failed.push((file.path.clone(), e));
            }
        }
    }

    let chunks = extracted
        .into_iter()
        .flat_map(|(file, chunks)| {
            let table = &table;
            chunks
                .into_iter()
                .map(move |raw| resolve_chunk(&file.path, raw, table))
        })
        .collect();

    Analysis { chunks, failed }
}

/// Analyze a single file for an incremental sync.
///
/// `context` should hold the project's declarations *outside* this file;
/// the file's own declarations are added before resolving.
///
/// # Errors
///
/// Returns [`ScryError::Parse`] when the file does not parse cleanly, so a
/// half-typed edit never looks like every chunk was deleted.
pub fn analyze_file(
    path: &str,
    content: &str,
    context: &SymbolTable,
) -> Result<Vec<Chunk>, ScryError> {
    let path = normalize_path(path);
    let raw = extract_file(&path, content)?;
    let mut table = context.clone();
    for chunk in &raw {
        table.declare_kind(&chunk.symbol, chunk.kind);
    }
    Ok(raw
        .into_iter()
        .map(|chunk| resolve_chunk(&path, chunk, &table))
        .collect())
}

fn resolve_chunk(path: &str, raw: ExtractedChunk, table: &SymbolTable) -> Chunk {
    let scope = raw.scope.as_deref();
    let calls = raw
        .call_sites
        .iter()
        .filter_map(|site| table.resolve(site, scope))
        .collect();
    Chunk {
        symbol: raw.symbol,
        file_path: path.to_string(),
        kind: raw.kind,
        line_range: raw.line_range,
        calls,
        content: raw.content,
    }
}

fn merge_duplicate_keys(chunks: Vec<ExtractedChunk>) -> Vec<ExtractedChunk> {
    let mut index: HashMap<(String, ChunkKind), usize> = HashMap::new();
    let mut merged: Vec<ExtractedChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let key = (chunk.symbol.clone(), chunk.kind);
        match index.get(&key) {
            Some(&i) => {
                let first = &mut merged[i];
                first.content.push('\n');
                first.content.push_str(&chunk.content);
                first.line_range = LineRange::new(
                    first.line_range.start.min(chunk.line_range.start),
                    first.line_range.end.max(chunk.line_range.end),
                );
                first.call_sites.extend(chunk.call_sites);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(chunk);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_resolve_across_files() {
        let files = vec![
            SourceFile::new(
                "src/cart.ts",
                "export class Cart {\n  add(i) { this.total(); showToast('added'); fetch('/x'); }\n  total() { return 0; }\n}\n",
            ),
            SourceFile::new(
                "src/ui/toast.ts",
                "export function showToast(msg) { console.log(msg); }\n",
            ),
        ];
        let analysis = analyze_sources(&files, &SymbolTable::default());
        let add = analysis
            .chunks
            .iter()
            .find(|c| c.symbol == "Cart.add")
            .unwrap();
        assert_eq!(add.calls, vec!["Cart.total", "showToast"]);
        assert!(analysis.failed.is_empty());
    }

    #[test]
    fn dependency_files_are_never_analyzed() {
        let files = vec![SourceFile::new(
            "node_modules/toast/index.js",
            "export function showToast() {}",
        )];
        let analysis = analyze_sources(&files, &SymbolTable::default());
        assert!(analysis.chunks.is_empty());
    }

    #[test]
    fn getter_and_setter_merge_into_one_chunk() {
        let source = "class Box {\n  get size() { return this._s; }\n  set size(v) { this._s = v; }\n}\n";
        let chunks = analyze_file("box.js", source, &SymbolTable::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].symbol, "Box.size");
        assert_eq!(chunks[0].line_range, LineRange::new(2, 3));
        assert!(chunks[0].content.contains("set size"));
    }

    #[test]
    fn analyze_file_uses_context_declarations() {
        let mut context = SymbolTable::default();
        context.declare("formatDate");
        let chunks = analyze_file(
            "./src/report.js",
            "function report(d) { return formatDate(d); }",
            &context,
        )
        .unwrap();
        assert_eq!(chunks[0].file_path, "src/report.js");
        assert_eq!(chunks[0].calls, vec!["formatDate"]);
    }

    #[test]
    fn analyze_file_propagates_parse_errors() {
        let result = analyze_file("a.py", "def broken(:\n", &SymbolTable::default());
        assert!(matches!(result, Err(ScryError::Parse(_))));
    }

    #[test]
    fn unsupported_files_yield_nothing() {
        let chunks = analyze_file("notes.md", "# title", &SymbolTable::default()).unwrap();
        assert!(chunks.is_empty());
    }
}
