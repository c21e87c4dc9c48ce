use std::path::Path;

use crate::analyzer::Analyzer;
use crate::ecma::EcmaAnalyzer;
use crate::python::PythonAnalyzer;
use crate::rust::RustAnalyzer;

/// Source language detected from a file extension.
///
/// # Examples
///
/// ```
/// use scry_analyzer::Language;
///
/// assert_eq!(Language::from_extension("tsx"), Language::Tsx);
/// assert_eq!(Language::from_extension("jsx"), Language::JavaScript);
/// assert_eq!(Language::from_extension("py"), Language::Python);
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// JavaScript, including JSX.
    JavaScript,
    /// TypeScript without JSX.
    TypeScript,
    /// TypeScript with JSX.
    Tsx,
    Python,
    Rust,
    Unknown,
}

impl Language {
    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "py" | "pyi" => Language::Python,
            "rs" => Language::Rust,
            _ => Language::Unknown,
        }
    }

    /// Detect language from a path's extension.
    pub fn from_path(path: &str) -> Self {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Get the tree-sitter grammar for this language.
    ///
    /// Returns `None` for `Language::Unknown`.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }

    /// The analyzer variant that understands this language.
    pub fn analyzer(&self) -> Option<Box<dyn Analyzer>> {
        match self {
            Language::JavaScript | Language::TypeScript | Language::Tsx => {
                Some(Box::new(EcmaAnalyzer::new(*self)))
            }
            Language::Python => Some(Box::new(PythonAnalyzer)),
            Language::Rust => Some(Box::new(RustAnalyzer)),
            Language::Unknown => None,
        }
    }

    /// Prefixes that start a line comment in this language.
    pub fn line_comment_prefixes(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["#"],
            Language::Unknown => &["//", "#"],
            _ => &["//"],
        }
    }

    /// Whether `/* ... */` block comments exist in this language.
    pub fn has_block_comments(&self) -> bool {
        !matches!(self, Language::Python)
    }
}

/// Path segments that mark a third-party dependency tree.
const DEPENDENCY_DIRS: &[&str] = &[
    "node_modules",
    "bower_components",
    "vendor",
    "site-packages",
    ".venv",
    "venv",
    "target",
    "dist",
    "build",
];

/// Whether `path` lives inside a third-party dependency or build output tree.
///
/// # Examples
///
/// ```
/// use scry_analyzer::is_dependency_path;
///
/// assert!(is_dependency_path("node_modules/react/index.js"));
/// assert!(is_dependency_path("web/node_modules/lodash/map.js"));
/// assert!(!is_dependency_path("src/vendored_utils.ts"));
/// ```
pub fn is_dependency_path(path: &str) -> bool {
    path.split(['/', '\\'])
        .any(|segment| DEPENDENCY_DIRS.contains(&segment))
}
