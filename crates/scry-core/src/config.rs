use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ScryError;

/// Top-level configuration loaded from `.scry.toml`.
///
/// Values present in the file override the defaults; nothing else is
/// layered on top. The only environment lookups are API keys left unset
/// here (`OPENAI_API_KEY`, `QDRANT_API_KEY`), read by the clients that need
/// them.
///
/// # Examples
///
/// ```
/// use scry_core::ScryConfig;
///
/// let config = ScryConfig::default();
/// assert_eq!(config.search.candidate_limit, 50);
/// assert_eq!(config.embedding.dimensions, 1536);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScryConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector store backend settings.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    /// Keyword extraction collaborator settings.
    #[serde(default)]
    pub keywords: KeywordsConfig,
    /// Ledger persistence settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Query pipeline tuning.
    #[serde(default)]
    pub search: SearchConfig,
}

impl ScryConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Io`] if the file cannot be read, or
    /// [`ScryError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use scry_core::ScryConfig;
    /// use std::path::Path;
    ///
    /// let config = ScryConfig::from_file(Path::new(".scry.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ScryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use scry_core::ScryConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// candidate_limit = 20
    /// "#;
    /// let config = ScryConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.candidate_limit, 20);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ScryError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScryError> {
        if self.embedding.dimensions == 0 {
            return Err(ScryError::Config(
                "embedding.dimensions must be greater than zero".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ScryError::Config(
                "embedding.batch_size must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(ScryError::Config(format!(
                "search.threshold must be within [0, 1], got {}",
                self.search.threshold
            )));
        }
        Ok(())
    }
}

/// Configuration for the embedding provider.
///
/// # Examples
///
/// ```
/// use scry_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "openai");
/// assert_eq!(config.model, "text-embedding-3-small");
/// assert_eq!(config.dimensions, 1536);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider (default: `"openai"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for the embedding provider.
    pub api_key: Option<String>,
    /// Model name (default: `"text-embedding-3-small"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimensions (default: 1536).
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Texts per embedding request (default: 64).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_batch_size() -> usize {
    64
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_embedding_dimensions(),
            base_url: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Which vector store implementation backs the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Local SQLite file, cosine similarity computed in-process.
    #[default]
    Sqlite,
    /// Remote Qdrant server over its REST API.
    Qdrant,
}

/// Vector store configuration.
///
/// # Examples
///
/// ```
/// use scry_core::{VectorBackend, VectorStoreConfig};
///
/// let config = VectorStoreConfig::default();
/// assert_eq!(config.backend, VectorBackend::Sqlite);
/// assert_eq!(config.url, "http://localhost:6333");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend selection (default: `"sqlite"`).
    #[serde(default)]
    pub backend: VectorBackend,
    /// Qdrant base URL.
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Qdrant API key (falls back to `QDRANT_API_KEY`).
    pub api_key: Option<String>,
    /// SQLite database path, relative to the working directory.
    #[serde(default = "default_vector_path")]
    pub path: PathBuf,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".into()
}

fn default_vector_path() -> PathBuf {
    PathBuf::from(".scry/vectors.db")
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            url: default_qdrant_url(),
            api_key: None,
            path: default_vector_path(),
        }
    }
}

/// Keyword extraction collaborator configuration.
///
/// # Examples
///
/// ```
/// use scry_core::KeywordsConfig;
///
/// let config = KeywordsConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.model, "gpt-4o-mini");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    /// Call the LLM collaborator at all (default: true). When false, the
    /// local whitespace fallback is always used.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Provider name (default: `"openai"`).
    #[serde(default = "default_keywords_provider")]
    pub provider: String,
    /// Chat model identifier.
    #[serde(default = "default_keywords_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_keywords_provider() -> String {
    "openai".into()
}

fn default_keywords_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_keywords_provider(),
            model: default_keywords_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// How ledgers are kept on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerMode {
    /// One ledger file per project, each with its own lock.
    #[default]
    Keyed,
    /// A single live ledger; loading another project replaces it.
    SingleActive,
}

/// Ledger persistence configuration.
///
/// # Examples
///
/// ```
/// use scry_core::{LedgerConfig, LedgerMode};
///
/// let config = LedgerConfig::default();
/// assert_eq!(config.mode, LedgerMode::Keyed);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding ledger JSON files.
    #[serde(default = "default_ledger_dir")]
    pub dir: PathBuf,
    /// Keyed (default) or single-active.
    #[serde(default)]
    pub mode: LedgerMode,
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from(".scry/ledgers")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: default_ledger_dir(),
            mode: LedgerMode::default(),
        }
    }
}

/// Query pipeline configuration.
///
/// # Examples
///
/// ```
/// use scry_core::SearchConfig;
///
/// let config = SearchConfig::default();
/// assert_eq!(config.candidate_limit, 50);
/// assert_eq!(config.threshold, 0.5);
/// assert!(config.deadline_ms.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Vector search candidates fetched before reranking (default: 50).
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Minimum normalized score kept, inclusive (default: 0.5).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Optional per-query deadline in milliseconds.
    pub deadline_ms: Option<u64>,
}

fn default_candidate_limit() -> usize {
    50
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            threshold: default_threshold(),
            deadline_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ScryConfig::default();
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.vector_store.backend, VectorBackend::Sqlite);
        assert_eq!(config.vector_store.path, PathBuf::from(".scry/vectors.db"));
        assert!(config.keywords.enabled);
        assert_eq!(config.ledger.mode, LedgerMode::Keyed);
        assert_eq!(config.ledger.dir, PathBuf::from(".scry/ledgers"));
        assert_eq!(config.search.candidate_limit, 50);
        assert_eq!(config.search.threshold, 0.5);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[embedding]
model = "text-embedding-3-large"
dimensions = 3072
base_url = "http://localhost:8080/v1"

[vector_store]
backend = "qdrant"
url = "http://qdrant:6333"

[keywords]
enabled = false

[ledger]
dir = "/var/lib/scry"
mode = "single-active"

[search]
candidate_limit = 25
threshold = 0.4
deadline_ms = 1500
"#;
        let config = ScryConfig::from_toml(toml).unwrap();
        assert_eq!(config.embedding.dimensions, 3072);
        assert_eq!(
            config.embedding.base_url.as_deref(),
            Some("http://localhost:8080/v1")
        );
        assert_eq!(config.vector_store.backend, VectorBackend::Qdrant);
        assert_eq!(config.vector_store.url, "http://qdrant:6333");
        assert!(!config.keywords.enabled);
        assert_eq!(config.ledger.mode, LedgerMode::SingleActive);
        assert_eq!(config.ledger.dir, PathBuf::from("/var/lib/scry"));
        assert_eq!(config.search.candidate_limit, 25);
        assert_eq!(config.search.deadline_ms, Some(1500));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ScryConfig::from_toml("").unwrap();
        assert_eq!(config.search.candidate_limit, 50);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = ScryConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let result = ScryConfig::from_toml("[search]\nthreshold = 1.5\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("threshold"), "unexpected error: {err}");
    }

    #[test]
    fn zero_dimensions_is_rejected() {
        let result = ScryConfig::from_toml("[embedding]\ndimensions = 0\n");
        assert!(result.is_err());
    }
}
