//! Keyword extraction: classify a query into primary, secondary, action,
//! and code-pattern terms.
//!
//! The LLM collaborator is optional. Any failure falls back to a local
//! whitespace tokenizer, so extraction never fails a query.

use std::time::Duration;

use async_trait::async_trait;
use scry_core::{Keywords, KeywordsConfig, ScryError};
use serde::Serialize;

/// Verbs that describe what code does rather than what it is about.
pub const ACTION_VERBS: &[&str] = &[
    "get", "set", "create", "update", "delete", "remove", "add", "show", "hide", "open", "close",
    "toggle", "reset", "clear", "handle", "fetch", "load", "save", "render", "send", "submit",
    "init", "build", "find", "search", "check", "validate", "parse", "format", "convert",
];

/// Classifies a natural-language query into [`Keywords`].
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, query: &str) -> Result<Keywords, ScryError>;
}

/// Local whitespace classifier used when no collaborator is available.
///
/// Tokens longer than four characters that are not action verbs become
/// primary terms; action verbs become actions. Secondary terms and code
/// patterns stay empty.
///
/// # Examples
///
/// ```
/// use scry_engine::keywords::fallback_keywords;
///
/// let kw = fallback_keywords("How do I show a toast?");
/// assert_eq!(kw.primary, vec!["toast"]);
/// assert_eq!(kw.actions, vec!["show"]);
/// assert!(kw.code_patterns.is_empty());
/// ```
pub fn fallback_keywords(query: &str) -> Keywords {
    let mut keywords = Keywords::default();
    for raw in query.split_whitespace() {
        let token = raw
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        let bucket = if ACTION_VERBS.contains(&token.as_str()) {
            &mut keywords.actions
        } else if token.chars().count() > 4 {
            &mut keywords.primary
        } else {
            continue;
        };
        if !bucket.contains(&token) {
            bucket.push(token);
        }
    }
    keywords
}

/// Extractor that always uses [`fallback_keywords`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalKeywordExtractor;

#[async_trait]
impl KeywordExtractor for LocalKeywordExtractor {
    async fn extract(&self, query: &str) -> Result<Keywords, ScryError> {
        Ok(fallback_keywords(query))
    }
}

/// Run `extractor`, degrading to the local fallback on any failure.
pub async fn extract_or_fallback(extractor: &dyn KeywordExtractor, query: &str) -> Keywords {
    match extractor.extract(query).await {
        Ok(keywords) => clean(keywords),
        Err(e) => {
            tracing::warn!(error = %e, "keyword extraction failed, using local fallback");
            fallback_keywords(query)
        }
    }
}

/// Trim terms, drop empties and duplicates.
fn clean(keywords: Keywords) -> Keywords {
    fn tidy(terms: Vec<String>) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.trim().to_string();
            if !term.is_empty() && !out.contains(&term) {
                out.push(term);
            }
        }
        out
    }
    Keywords {
        primary: tidy(keywords.primary),
        secondary: tidy(keywords.secondary),
        actions: tidy(keywords.actions),
        code_patterns: tidy(keywords.code_patterns),
    }
}

const SYSTEM_PROMPT: &str = "You classify search queries about a codebase. \
Respond with a JSON object with four string arrays: \
\"primary\" (the main domain nouns the user is looking for), \
\"secondary\" (supporting context terms), \
\"actions\" (verbs describing what the code does), and \
\"codePatterns\" (likely identifiers in camelCase, PascalCase, or snake_case, \
e.g. \"show a toast\" -> \"showToast\"). Use lowercase for everything except codePatterns. \
Return empty arrays when nothing fits.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Keyword extraction through an OpenAI-compatible chat completions API in
/// JSON mode.
///
/// # Examples
///
/// ```
/// use scry_core::KeywordsConfig;
/// use scry_engine::keywords::LlmKeywordExtractor;
///
/// let config = KeywordsConfig {
///     api_key: Some("test-key".into()),
///     ..KeywordsConfig::default()
/// };
/// let extractor = LlmKeywordExtractor::new(&config).unwrap();
/// assert_eq!(extractor.model(), "gpt-4o-mini");
/// ```
pub struct LlmKeywordExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for LlmKeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmKeywordExtractor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmKeywordExtractor {
    /// Create an extractor from configuration. The API key falls back to
    /// `OPENAI_API_KEY`; a keyless extractor is allowed for local servers.
    ///
    /// # Errors
    ///
    /// - [`ScryError::Config`] if the provider is not OpenAI-compatible.
    /// - [`ScryError::Keywords`] if the HTTP client cannot be built.
    pub fn new(config: &KeywordsConfig) -> Result<Self, ScryError> {
        if config.provider != "openai" {
            return Err(ScryError::Config(format!(
                "unsupported keywords provider '{}': only OpenAI-compatible chat endpoints are supported (set keywords.base_url for others)",
                config.provider
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScryError::Keywords(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract(&self, query: &str) -> Result<Keywords, ScryError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: query },
            ],
            "temperature": 0.0,
            "response_format": { "type": "json_object" },
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ScryError::Keywords(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ScryError::Keywords(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ScryError::Keywords(format!("failed to parse response: {e}")))?;

        let content = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                ScryError::Keywords(format!("unexpected response structure: {response_body}"))
            })?;

        serde_json::from_str(content)
            .map_err(|e| ScryError::Keywords(format!("model returned invalid keywords JSON: {e}")))
    }
}
