//! Embedding client for chunk and query text.
//!
//! The [`Embedder`] trait is the collaborator boundary: sync and query code
//! only ever see fixed-length vectors. [`OpenAiEmbedder`] talks to any
//! OpenAI-compatible `/embeddings` endpoint. No retry is performed; a failed
//! call aborts whatever sync step issued it.

use async_trait::async_trait;
use scry_core::{EmbeddingConfig, ScryError};
use serde::{Deserialize, Serialize};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Returns one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ScryError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ScryError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ScryError::Embedding("empty embedding response".into()))
    }

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_BATCH_SIZE: usize = 64;

/// Client for an OpenAI-compatible embeddings API.
///
/// # Examples
///
/// ```
/// use scry_index::embedding::{Embedder, OpenAiEmbedder};
///
/// let client = OpenAiEmbedder::new("test-key");
/// assert_eq!(client.model(), "text-embedding-3-small");
/// assert_eq!(client.dimensions(), 1536);
/// ```
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Create a client with default model and endpoint.
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `OPENAI_API_KEY` env var if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Config`] if no API key is available or the
    /// provider is not OpenAI-compatible.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use scry_core::EmbeddingConfig;
    /// use scry_index::embedding::OpenAiEmbedder;
    ///
    /// let client = OpenAiEmbedder::with_config(&EmbeddingConfig::default()).unwrap();
    /// ```
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, ScryError> {
        if config.provider != "openai" {
            return Err(ScryError::Config(format!(
                "unsupported embedding provider '{}': only OpenAI-compatible endpoints are supported (set embedding.base_url for others)",
                config.provider
            )));
        }
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ScryError::Config(
                    "embedding API key not found: set embedding.api_key in .scry.toml or OPENAI_API_KEY env var".into(),
                )
            })?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Point the client at a different endpoint (proxies, local servers, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the expected dimension of returned vectors.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, ScryError> {
        let request = EmbedRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScryError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(ScryError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let mut parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ScryError::Embedding(format!("failed to parse response: {e}")))?;

        if parsed.data.len() != batch.len() {
            return Err(ScryError::Embedding(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        // Providers may return items out of order; `index` is authoritative.
        parsed.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for item in parsed.data {
            if item.embedding.len() != self.dimensions {
                return Err(ScryError::Embedding(format!(
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    item.embedding.len(),
                    self.dimensions
                )));
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    /// Splits the input into sub-batches of the configured batch size.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ScryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(model = %self.model, size = batch.len(), "embedding batch");
            all.extend(self.request(batch).await?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
