//! End-to-end: sync sources into a SQLite-backed index, then query it
//! through the `Scry` facade.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scry_analyzer::SourceFile;
use scry_core::{
    ChangeKind, Deadline, FileChange, Keywords, LedgerMode, ScryError, SearchConfig,
};
use scry_engine::{KeywordExtractor, LocalKeywordExtractor, Scry};
use scry_index::vector::{
    collection_name, Filter, Point, ScoredPoint, ScrollPage, SqliteStore, VectorStore,
};
use scry_index::{ChangeType, Embedder, LedgerStore};

const TOAST_TS: &str = "\
export function showToast(msg) {
  render(msg);
}
";

const DATE_TS: &str = "\
export function formatDate(d) {
  return d.toISOString();
}
";

/// Letter-frequency embedding: deterministic and content-sensitive.
struct Histogram {
    calls: AtomicUsize,
}

impl Histogram {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for Histogram {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ScryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                    v[(c - b'a') as usize] += 1.0;
                }
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        26
    }

    fn model(&self) -> &str {
        "histogram"
    }
}

/// Places `formatDate` slightly closer to every query than `showToast`.
struct FavorsFormatDate;

#[async_trait]
impl Embedder for FavorsFormatDate {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ScryError> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.contains("Symbol: formatDate") {
                    vec![0.99, 0.14]
                } else if t.contains("Symbol: showToast") {
                    vec![0.95, 0.31]
                } else {
                    vec![1.0, 0.0]
                }
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct Fixed(Keywords);

#[async_trait]
impl KeywordExtractor for Fixed {
    async fn extract(&self, _query: &str) -> Result<Keywords, ScryError> {
        Ok(self.0.clone())
    }
}

/// SQLite store that records every `delete_by_ids` call.
struct Recording {
    inner: SqliteStore,
    deletes: Mutex<Vec<Vec<String>>>,
}

impl Recording {
    fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory().unwrap(),
            deletes: Mutex::new(Vec::new()),
        }
    }

    fn delete_calls(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for Recording {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), ScryError> {
        self.inner.ensure_collection(name, dimensions).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ScryError> {
        self.inner.collection_exists(name).await
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), ScryError> {
        self.inner.upsert(name, points).await
    }

    async fn delete_by_ids(&self, name: &str, ids: &[String]) -> Result<(), ScryError> {
        self.deletes.lock().unwrap().push(ids.to_vec());
        self.inner.delete_by_ids(name, ids).await
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, ScryError> {
        self.inner.search(name, vector, limit, filter).await
    }

    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        cursor: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, ScryError> {
        self.inner.scroll(name, limit, cursor, filter).await
    }

    async fn count(&self, name: &str, filter: Option<&Filter>) -> Result<usize, ScryError> {
        self.inner.count(name, filter).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), ScryError> {
        self.inner.drop_collection(name).await
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    scry: Scry,
}

fn harness(
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    keywords: Arc<dyn KeywordExtractor>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledgers = Arc::new(LedgerStore::new(dir.path(), LedgerMode::Keyed));
    let scry = Scry::new(embedder, store, ledgers, keywords, SearchConfig::default());
    Harness { _dir: dir, scry }
}

fn toast_keywords() -> Keywords {
    Keywords {
        primary: vec!["toast".into()],
        code_patterns: vec!["showToast".into()],
        ..Keywords::default()
    }
}

fn sources() -> Vec<SourceFile> {
    vec![
        SourceFile::new("ui/toast.ts", TOAST_TS),
        SourceFile::new("utils/date.ts", DATE_TS),
    ]
}

#[tokio::test]
async fn show_toast_outranks_format_date_despite_raw_similarity() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let h = harness(
        Arc::new(FavorsFormatDate),
        store.clone(),
        Arc::new(Fixed(toast_keywords())),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();

    // Raw vector similarity alone prefers formatDate.
    let raw = store
        .search(&collection_name("shop"), &[1.0, 0.0], 10, None)
        .await
        .unwrap();
    assert_eq!(raw[0].payload.symbol, "formatDate");
    assert!(raw[0].score > raw[1].score);

    let results = h.scry.query("shop", "how do I show a toast").await.unwrap();
    assert_eq!(results[0].payload.symbol, "showToast");
    assert_eq!(results[0].payload.file_path, "ui/toast.ts");
    assert_eq!(results[0].score, 1.0);
    assert!(results
        .iter()
        .all(|r| r.payload.symbol != "formatDate" || r.score < results[0].score));
}

#[tokio::test]
async fn local_fallback_still_ranks_the_toast_first() {
    let h = harness(
        Arc::new(FavorsFormatDate),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();

    let results = h.scry.query("shop", "how do I show a toast").await.unwrap();
    assert_eq!(results[0].payload.symbol, "showToast");
}

#[tokio::test]
async fn repeated_full_sync_is_idempotent() {
    let embedder = Arc::new(Histogram::new());
    let h = harness(
        embedder.clone(),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );

    let first = h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();
    assert_eq!(first.count(ChangeType::Created), 2);
    let calls_after_first = embedder.calls.load(Ordering::SeqCst);

    let second = h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged, 2);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);

    let stats = h.scry.stats("shop").await.unwrap();
    assert_eq!(stats.point_count, 2);
    assert_eq!(stats.chunk_count, 2);
    assert_eq!(stats.file_count, 2);
}

#[tokio::test]
async fn cosmetic_edit_does_not_reembed() {
    let embedder = Arc::new(Histogram::new());
    let h = harness(
        embedder.clone(),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();
    let calls = embedder.calls.load(Ordering::SeqCst);

    let edited = "\
export function showToast(msg) {
  // render the message
  console.log('showing', msg);
  render( msg );
}
";
    let report = h.scry.sync_file("shop", "ui/toast.ts", edited).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.unchanged, 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn removing_a_function_deletes_exactly_one_point() {
    let store = Arc::new(Recording::new());
    let h = harness(
        Arc::new(Histogram::new()),
        store.clone(),
        Arc::new(LocalKeywordExtractor),
    );
    let two = "\
export function showToast(msg) { render(msg); }
export function hideToast() { clear(); }
";
    h.scry.sync_file("shop", "ui/toast.ts", two).await.unwrap();
    assert!(store.delete_calls().is_empty());

    let one = "export function showToast(msg) { render(msg); }\n";
    let report = h.scry.sync_file("shop", "ui/toast.ts", one).await.unwrap();
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].symbol, "hideToast");
    assert_eq!(report.transitions[0].change, ChangeType::Deleted);

    let calls = store.delete_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(h.scry.stats("shop").await.unwrap().point_count, 1);
}

#[tokio::test]
async fn file_deletion_event_removes_all_its_chunks() {
    let h = harness(
        Arc::new(Histogram::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();

    let change = FileChange {
        path: "ui/toast.ts".into(),
        content: String::new(),
        kind: ChangeKind::Delete,
    };
    let report = h.scry.apply_change("shop", &change).await.unwrap();
    assert_eq!(report.count(ChangeType::Deleted), 1);

    let stats = h.scry.stats("shop").await.unwrap();
    assert_eq!(stats.point_count, 1);
    assert_eq!(stats.file_count, 1);
}

#[tokio::test]
async fn unparseable_file_is_skipped_and_keeps_its_chunks() {
    let h = harness(
        Arc::new(Histogram::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();

    let report = h
        .scry
        .sync_file("shop", "ui/toast.ts", "export function showToast(msg {")
        .await
        .unwrap();
    assert_eq!(report.skipped_files, vec!["ui/toast.ts"]);
    assert!(report.is_noop());
    assert_eq!(h.scry.stats("shop").await.unwrap().chunk_count, 2);
}

#[tokio::test]
async fn identical_queries_return_identical_results() {
    let h = harness(
        Arc::new(Histogram::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    let mut files = sources();
    files.push(SourceFile::new(
        "ui/modal.ts",
        "export class Modal {\n  open() { show(); }\n  close() { hide(); }\n}\n",
    ));
    h.scry.sync_full("shop", "/src/shop", &files).await.unwrap();

    let first = h.scry.query("shop", "open the modal dialog").await.unwrap();
    let second = h.scry.query("shop", "open the modal dialog").await.unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first[0].score, 1.0);
    assert!(first.iter().all(|r| (0.5..=1.0).contains(&r.score)));
}

#[tokio::test]
async fn unknown_and_dropped_projects_are_not_active() {
    let h = harness(
        Arc::new(Histogram::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    let err = h.scry.query("blog", "anything").await.unwrap_err();
    assert!(matches!(err, ScryError::NoActiveProject(_)));

    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();
    assert!(h.scry.delete_project_index("shop").await.unwrap());
    assert!(matches!(
        h.scry.stats("shop").await.unwrap_err(),
        ScryError::NoActiveProject(_)
    ));
    assert!(matches!(
        h.scry.query("shop", "toast").await.unwrap_err(),
        ScryError::NoActiveProject(_)
    ));
}

#[tokio::test]
async fn expired_query_deadline_is_reported() {
    let h = harness(
        Arc::new(Histogram::new()),
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(LocalKeywordExtractor),
    );
    h.scry.sync_full("shop", "/src/shop", &sources()).await.unwrap();

    let past = Deadline::at(std::time::Instant::now() - std::time::Duration::from_millis(5));
    let err = h
        .scry
        .query_with_deadline("shop", "toast", past)
        .await
        .unwrap_err();
    assert!(matches!(err, ScryError::DeadlineExceeded(_)));
}
