//! Vendor-neutral vector index adapter.
//!
//! One collection per project. Points carry a [`PointPayload`] and are
//! addressed by deterministic ids (see [`point_id`]), so writing the same
//! chunk twice overwrites rather than duplicates.

mod qdrant;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use scry_core::{ChunkKey, PointPayload, ScryConfig, ScryError, VectorBackend};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use qdrant::QdrantStore;
pub use sqlite::SqliteStore;

/// Namespace for point ids. Changing it orphans every stored point.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_43a2_9d0e_5c71_8a3e_2f94_c05d_7e18);

/// A point to write: id, embedding, and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A search hit. Vectors are never returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
    pub payload: PointPayload,
}

/// A point as returned by [`VectorStore::scroll`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: PointPayload,
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    /// Pass back as `cursor` to continue; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Payload fields that filters can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadField {
    ProjectName,
    FilePath,
    Kind,
    Symbol,
}

impl PayloadField {
    /// Payload key as stored.
    pub fn key(&self) -> &'static str {
        match self {
            PayloadField::ProjectName => "projectName",
            PayloadField::FilePath => "filePath",
            PayloadField::Kind => "kind",
            PayloadField::Symbol => "symbol",
        }
    }

    fn value_of<'a>(&self, payload: &'a PointPayload) -> &'a str {
        match self {
            PayloadField::ProjectName => &payload.project_name,
            PayloadField::FilePath => &payload.file_path,
            PayloadField::Kind => payload.kind.as_str(),
            PayloadField::Symbol => &payload.symbol,
        }
    }
}

/// Exact match of one payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: PayloadField,
    pub value: String,
}

/// Exact-match conjunction (`must`) and disjunction (`should`) over payload
/// fields. An empty `should` list places no constraint.
///
/// # Examples
///
/// ```
/// use scry_index::vector::{Filter, PayloadField};
///
/// let filter = Filter::new()
///     .must(PayloadField::ProjectName, "shop")
///     .must(PayloadField::FilePath, "src/cart.ts");
/// assert_eq!(filter.must_conditions().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    must: Vec<Condition>,
    should: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on `projectName` only.
    pub fn project(project: &str) -> Self {
        Self::new().must(PayloadField::ProjectName, project)
    }

    pub fn must(mut self, field: PayloadField, value: impl Into<String>) -> Self {
        self.must.push(Condition {
            field,
            value: value.into(),
        });
        self
    }

    pub fn should(mut self, field: PayloadField, value: impl Into<String>) -> Self {
        self.should.push(Condition {
            field,
            value: value.into(),
        });
        self
    }

    pub fn must_conditions(&self) -> &[Condition] {
        &self.must
    }

    pub fn should_conditions(&self) -> &[Condition] {
        &self.should
    }

    /// Evaluate the filter against a payload.
    pub fn matches(&self, payload: &PointPayload) -> bool {
        let hit = |c: &Condition| c.field.value_of(payload) == c.value;
        self.must.iter().all(hit) && (self.should.is_empty() || self.should.iter().any(hit))
    }
}

/// Storage for per-project vector collections.
///
/// Operations on a collection that does not exist fail with
/// [`ScryError::CollectionNotFound`]; transport and backend failures are
/// [`ScryError::VectorStore`].
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if missing. Idempotent.
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), ScryError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, ScryError>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), ScryError>;

    /// Delete points by id. Unknown ids are ignored.
    async fn delete_by_ids(&self, name: &str, ids: &[String]) -> Result<(), ScryError>;

    /// Top `limit` points by cosine similarity, best first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, ScryError>;

    /// Page through points in id order.
    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        cursor: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, ScryError>;

    /// Number of points, optionally only those matching `filter`.
    async fn count(&self, name: &str, filter: Option<&Filter>) -> Result<usize, ScryError>;

    /// Drop the collection and all its points. Dropping a missing
    /// collection succeeds.
    async fn drop_collection(&self, name: &str) -> Result<(), ScryError>;

    /// Replace `old_ids` with `points`: delete, then insert.
    ///
    /// There is no multi-operation transaction underneath. If the insert
    /// fails after the delete succeeded, the caller's ledger still lists the
    /// old chunk, and retrying the same replace converges.
    async fn replace(
        &self,
        name: &str,
        old_ids: &[String],
        points: &[Point],
    ) -> Result<(), ScryError> {
        if !old_ids.is_empty() {
            self.delete_by_ids(name, old_ids).await?;
        }
        self.upsert(name, points).await
    }
}

/// Collection name for a project: case-normalized, restricted to
/// `[a-z0-9_]`.
///
/// Distinct project names can share a collection ("Shop" and "shop"), so
/// anything touching one project's points must also filter on
/// [`Filter::project`].
///
/// # Examples
///
/// ```
/// use scry_index::vector::collection_name;
///
/// assert_eq!(collection_name("My Shop"), "scry_my_shop");
/// assert_eq!(collection_name("my-shop"), collection_name("MY-SHOP"));
/// ```
pub fn collection_name(project: &str) -> String {
    let slug: String = project
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("scry_{slug}")
}

/// Deterministic point id for a chunk identity within a project.
///
/// # Examples
///
/// ```
/// use scry_core::{ChunkKey, ChunkKind};
/// use scry_index::vector::point_id;
///
/// let key = ChunkKey {
///     symbol: "showToast".into(),
///     file_path: "ui/toast.ts".into(),
///     kind: ChunkKind::Function,
/// };
/// assert_eq!(point_id("shop", &key), point_id("shop", &key));
/// assert_ne!(point_id("shop", &key), point_id("blog", &key));
/// ```
pub fn point_id(project: &str, key: &ChunkKey) -> String {
    let name = format!(
        "{project}\u{1f}{}\u{1f}{}\u{1f}{}",
        key.file_path, key.kind, key.symbol
    );
    Uuid::new_v5(&POINT_NAMESPACE, name.as_bytes()).to_string()
}

/// Build the configured vector store.
///
/// # Errors
///
/// Returns [`ScryError::VectorStore`] if the SQLite file cannot be opened.
pub fn open_store(config: &ScryConfig) -> Result<Arc<dyn VectorStore>, ScryError> {
    let vs = &config.vector_store;
    match vs.backend {
        VectorBackend::Sqlite => Ok(Arc::new(SqliteStore::open(&vs.path)?)),
        VectorBackend::Qdrant => {
            let api_key = vs
                .api_key
                .clone()
                .or_else(|| std::env::var("QDRANT_API_KEY").ok());
            Ok(Arc::new(QdrantStore::new(&vs.url, api_key)))
        }
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::{ChunkKind, LineRange};

    pub(crate) fn payload(project: &str, file: &str, symbol: &str) -> PointPayload {
        PointPayload {
            project_name: project.into(),
            symbol: symbol.into(),
            kind: ChunkKind::Function,
            file_path: file.into(),
            line_range: LineRange::new(1, 2),
            calls: vec![],
            content: format!("function {symbol}() {{}}"),
        }
    }

    #[test]
    fn filter_must_and_should() {
        let p = payload("shop", "ui/toast.ts", "showToast");
        assert!(Filter::project("shop").matches(&p));
        assert!(!Filter::project("blog").matches(&p));

        let either = Filter::project("shop")
            .should(PayloadField::Symbol, "hideToast")
            .should(PayloadField::Symbol, "showToast");
        assert!(either.matches(&p));

        let neither = Filter::new().should(PayloadField::Kind, "component");
        assert!(!neither.matches(&p));
    }

    #[test]
    fn point_ids_differ_by_kind() {
        let mut key = ChunkKey {
            symbol: "Toast".into(),
            file_path: "ui/Toast.tsx".into(),
            kind: ChunkKind::Function,
        };
        let a = point_id("shop", &key);
        key.kind = ChunkKind::Component;
        assert_ne!(a, point_id("shop", &key));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
