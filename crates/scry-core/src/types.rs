use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ScryError;

/// Classification of an extracted chunk.
///
/// # Examples
///
/// ```
/// use scry_core::ChunkKind;
///
/// assert_eq!(ChunkKind::ClassMethod.to_string(), "class-method");
/// assert_eq!("component".parse::<ChunkKind>().unwrap(), ChunkKind::Component);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    /// A named top-level function, or a variable bound to a closure.
    Function,
    /// A method declared inside a named class.
    ClassMethod,
    /// An uppercase-named closure whose body renders markup.
    Component,
}

impl ChunkKind {
    /// The wire name used in payloads and the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::ClassMethod => "class-method",
            ChunkKind::Component => "component",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(ChunkKind::Function),
            "class-method" => Ok(ChunkKind::ClassMethod),
            "component" => Ok(ChunkKind::Component),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

/// Inclusive, 1-indexed line span. Serialized as `[start, end]`.
///
/// # Examples
///
/// ```
/// use scry_core::LineRange;
///
/// let range = LineRange::new(3, 9);
/// assert_eq!(serde_json::to_string(&range).unwrap(), "[3,9]");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct LineRange {
    /// First line (1-indexed).
    pub start: u32,
    /// Last line (1-indexed, inclusive).
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl From<(u32, u32)> for LineRange {
    fn from((start, end): (u32, u32)) -> Self {
        Self { start, end }
    }
}

impl From<LineRange> for (u32, u32) {
    fn from(range: LineRange) -> Self {
        (range.start, range.end)
    }
}

/// Identity of a chunk within one project: `(symbol, filePath, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub symbol: String,
    pub file_path: String,
    pub kind: ChunkKind,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.file_path, self.symbol, self.kind)
    }
}

/// A named, extractable source unit plus its best-effort outbound calls.
///
/// # Examples
///
/// ```
/// use scry_core::{Chunk, ChunkKind, LineRange};
///
/// let chunk = Chunk {
///     symbol: "Cart.addItem".into(),
///     file_path: "src/cart.ts".into(),
///     kind: ChunkKind::ClassMethod,
///     line_range: LineRange::new(4, 8),
///     calls: vec!["Cart.recalculate".into()],
///     content: "addItem(item) { this.recalculate(); }".into(),
/// };
/// assert_eq!(chunk.key().symbol, "Cart.addItem");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `Class.method` or a bare identifier.
    pub symbol: String,
    /// Path relative to the project root, `/`-separated.
    pub file_path: String,
    pub kind: ChunkKind,
    pub line_range: LineRange,
    /// Resolved outbound references, in source order. Duplicates allowed.
    #[serde(default)]
    pub calls: Vec<String>,
    /// Canonical source text of the unit.
    pub content: String,
}

impl Chunk {
    /// The identity key of this chunk.
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            symbol: self.symbol.clone(),
            file_path: self.file_path.clone(),
            kind: self.kind,
        }
    }

    /// Render the canonical embedding input: symbol, kind, file, calls, body.
    ///
    /// # Examples
    ///
    /// ```
    /// use scry_core::{Chunk, ChunkKind, LineRange};
    ///
    /// let chunk = Chunk {
    ///     symbol: "showToast".into(),
    ///     file_path: "ui/toast.ts".into(),
    ///     kind: ChunkKind::Function,
    ///     line_range: LineRange::new(1, 3),
    ///     calls: vec![],
    ///     content: "function showToast(msg) {}".into(),
    /// };
    /// let text = chunk.embedding_text();
    /// assert!(text.starts_with("Symbol: showToast\nKind: function\nFile: ui/toast.ts"));
    /// ```
    pub fn embedding_text(&self) -> String {
        let calls = if self.calls.is_empty() {
            "none".to_string()
        } else {
            self.calls.join(", ")
        };
        format!(
            "Symbol: {}\nKind: {}\nFile: {}\nCalls: {}\n\n{}",
            self.symbol, self.kind, self.file_path, calls, self.content
        )
    }
}

/// Metadata stored alongside each vector point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointPayload {
    pub project_name: String,
    pub symbol: String,
    pub kind: ChunkKind,
    pub file_path: String,
    pub line_range: LineRange,
    #[serde(default)]
    pub calls: Vec<String>,
    pub content: String,
}

impl PointPayload {
    /// Build the payload for `chunk` in `project`.
    pub fn from_chunk(project: &str, chunk: &Chunk) -> Self {
        Self {
            project_name: project.to_string(),
            symbol: chunk.symbol.clone(),
            kind: chunk.kind,
            file_path: chunk.file_path.clone(),
            line_range: chunk.line_range,
            calls: chunk.calls.clone(),
            content: chunk.content.clone(),
        }
    }
}

/// Terms classified out of a natural-language query.
///
/// # Examples
///
/// ```
/// use scry_core::Keywords;
///
/// let kw: Keywords = serde_json::from_str(
///     r#"{"primary":["toast"],"codePatterns":["showToast"]}"#,
/// ).unwrap();
/// assert_eq!(kw.code_patterns, vec!["showToast"]);
/// assert!(kw.secondary.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keywords {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub code_patterns: Vec<String>,
}

/// One reranked query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    /// Point id in the vector store.
    pub id: String,
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    /// Cosine similarity reported by the vector store.
    pub similarity: f64,
    /// Boosted score before normalization.
    pub raw_score: f64,
    /// Rerank rules that fired, in evaluation order.
    pub reasons: Vec<String>,
    pub payload: PointPayload,
}

/// What happened to a file, as reported by the file-change collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// A single file-change event pushed to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Path relative to the project root.
    pub path: String,
    /// Full file content; ignored for deletions.
    #[serde(default)]
    pub content: String,
    pub kind: ChangeKind,
}

/// A caller-supplied point in time after which a pipeline stops.
///
/// Deadlines are only checked between stages, never in the middle of a
/// network call.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use scry_core::Deadline;
///
/// let deadline = Deadline::after(Duration::from_secs(60));
/// assert!(deadline.check("vector search").is_ok());
/// assert!(Deadline::none().check("rerank").is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline at all.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// Build from an optional millisecond budget (as found in config).
    pub fn from_millis(ms: Option<u64>) -> Self {
        ms.map(|ms| Self::after(Duration::from_millis(ms)))
            .unwrap_or_default()
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`ScryError::DeadlineExceeded`] naming the stage about to
    /// start, if the deadline has passed.
    pub fn check(&self, next_stage: &'static str) -> Result<(), ScryError> {
        if self.is_expired() {
            Err(ScryError::DeadlineExceeded(next_stage))
        } else {
            Ok(())
        }
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use scry_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
