use std::path::PathBuf;

/// Errors that can occur across scry.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use scry_core::ScryError;
///
/// let err = ScryError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScryError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store failure (unreachable, rejected request, bad response).
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Keyword extraction collaborator failure.
    #[error("keyword extraction error: {0}")]
    Keywords(String),

    /// Ledger could not be loaded or written.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// No ledger is live for the requested project.
    #[error("no active project: {0}")]
    NoActiveProject(String),

    /// The project's vector collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A caller-supplied deadline passed between two pipeline stages.
    #[error("deadline exceeded before {0}")]
    DeadlineExceeded(&'static str),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
