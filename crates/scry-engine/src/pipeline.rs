//! Query pipeline: keywords → expansion → vector search → rerank →
//! normalize and threshold.

use std::cmp::Ordering;
use std::sync::Arc;

use scry_core::{Deadline, RankedResult, ScryError, SearchConfig};
use scry_index::vector::{collection_name, Filter, ScoredPoint, VectorStore};
use scry_index::Embedder;

use crate::expand::expand_query;
use crate::keywords::{extract_or_fallback, KeywordExtractor};
use crate::rerank::{rerank, QueryTerms};

/// Runs natural-language queries against one vector store.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    keywords: Arc<dyn KeywordExtractor>,
    config: SearchConfig,
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("model", &self.embedder.model())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        keywords: Arc<dyn KeywordExtractor>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            keywords,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run `text` against `project`'s collection.
    ///
    /// A blank query returns no results without calling any collaborator.
    ///
    /// # Errors
    ///
    /// - [`ScryError::Embedding`] if the expanded query cannot be embedded.
    /// - [`ScryError::CollectionNotFound`] if the project was never synced.
    /// - [`ScryError::VectorStore`] if the search fails; no partial results.
    /// - [`ScryError::DeadlineExceeded`] if `deadline` passes between stages.
    pub async fn run(
        &self,
        project: &str,
        text: &str,
        deadline: Deadline,
    ) -> Result<Vec<RankedResult>, ScryError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        deadline.check("keyword extraction")?;
        let keywords = extract_or_fallback(self.keywords.as_ref(), text).await;
        tracing::debug!(
            primary = ?keywords.primary,
            secondary = ?keywords.secondary,
            actions = ?keywords.actions,
            code_patterns = ?keywords.code_patterns,
            "query keywords"
        );

        deadline.check("embedding")?;
        let expanded = expand_query(text, &keywords);
        let vector = self.embedder.embed(&expanded).await?;

        deadline.check("vector search")?;
        let hits = self
            .store
            .search(
                &collection_name(project),
                &vector,
                self.config.candidate_limit,
                Some(&Filter::project(project)),
            )
            .await?;

        deadline.check("rerank")?;
        let terms = QueryTerms::new(&keywords);
        let candidates = hits.into_iter().map(|hit| score_hit(hit, &terms)).collect();
        let results = normalize_scores(candidates, self.config.threshold);

        tracing::info!(project, query = %text, results = results.len(), "query complete");
        Ok(results)
    }
}

fn score_hit(hit: ScoredPoint, terms: &QueryTerms) -> RankedResult {
    let reranked = rerank(hit.score, &hit.payload, terms);
    if !reranked.reasons.is_empty() {
        tracing::debug!(
            symbol = %hit.payload.symbol,
            file = %hit.payload.file_path,
            similarity = hit.score,
            boosted = reranked.score,
            reasons = ?reranked.reasons,
            "rerank"
        );
    }
    RankedResult {
        id: hit.id,
        score: reranked.score,
        similarity: hit.score,
        raw_score: reranked.score,
        reasons: reranked.reasons,
        payload: hit.payload,
    }
}

/// Rescale `raw_score` to `[0, 1]` with min-max normalization, drop results
/// below `threshold` (inclusive boundary), and sort best first.
///
/// When every raw score is equal, every result normalizes to 1.0. Ties are
/// broken by symbol, file path, then id, so output order is stable.
///
/// # Examples
///
/// ```
/// use scry_core::{ChunkKind, LineRange, PointPayload, RankedResult};
/// use scry_engine::pipeline::normalize_scores;
///
/// let result = |id: &str, raw: f64| RankedResult {
///     id: id.into(),
///     score: 0.0,
///     similarity: raw,
///     raw_score: raw,
///     reasons: vec![],
///     payload: PointPayload {
///         project_name: "shop".into(),
///         symbol: id.into(),
///         kind: ChunkKind::Function,
///         file_path: "a.ts".into(),
///         line_range: LineRange::new(1, 1),
///         calls: vec![],
///         content: String::new(),
///     },
/// };
/// let kept = normalize_scores(vec![result("a", 2.0), result("b", 1.0), result("c", 0.0)], 0.5);
/// let scores: Vec<f64> = kept.iter().map(|r| r.score).collect();
/// assert_eq!(scores, vec![1.0, 0.5]);
/// ```
pub fn normalize_scores(mut results: Vec<RankedResult>, threshold: f64) -> Vec<RankedResult> {
    if results.is_empty() {
        return results;
    }

    let (min, max) = results.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.raw_score), hi.max(r.raw_score))
    });
    let range = max - min;

    for r in &mut results {
        r.score = if range > 0.0 {
            (r.raw_score - min) / range
        } else {
            1.0
        };
    }

    results.retain(|r| r.score >= threshold);
    results.sort_by(compare_ranked);
    results
}

fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.payload.symbol.cmp(&b.payload.symbol))
        .then_with(|| a.payload.file_path.cmp(&b.payload.file_path))
        .then_with(|| a.id.cmp(&b.id))
}
