//! Sync engine: analysis → diff → embedding → vector mutation → ledger.
//!
//! Ordering is what keeps the index honest. Every sync step runs in this
//! order, under the project's writer lock:
//!
//! 1. analyze and diff against the stored ledger (pure, no side effects);
//! 2. embed every created/updated chunk (failure aborts, nothing mutated);
//! 3. apply vector mutations: deletes, then replaces, then inserts;
//! 4. rewrite the ledger, once, at the very end.
//!
//! If any step fails the ledger is untouched, so repeating the same call is
//! safe. Deadlines are checked before embedding and before the first vector
//! mutation, never after it: once the store has changed, the ledger write
//! always follows. Point ids are derived from chunk identity, so a repeated insert
//! overwrites rather than duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use scry_analyzer::{analyze_file, analyze_sources, normalize_path, SourceFile, SymbolTable};
use scry_core::{ChangeKind, Chunk, ChunkKind, Deadline, FileChange, PointPayload, ScryError};
use serde::{Deserialize, Serialize};

use crate::diff::{diff_file, diff_full_scan, ChangeSet, ChangeType, Transition};
use crate::embedding::Embedder;
use crate::ledger::{Ledger, LedgerStore};
use crate::vector::{collection_name, point_id, Filter, PayloadField, Point, VectorStore};

const SCROLL_PAGE: usize = 256;

/// One transition as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub symbol: String,
    pub file_path: String,
    pub kind: ChunkKind,
    pub change: ChangeType,
}

/// Outcome of a sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub project: String,
    pub transitions: Vec<TransitionRecord>,
    /// Chunks whose normalized content did not change.
    pub unchanged: usize,
    /// Files skipped because they failed to parse.
    pub skipped_files: Vec<String>,
    /// Stray points removed by the post-sync sweep.
    pub orphans_removed: usize,
}

impl SyncReport {
    fn new(project: &str, changes: &ChangeSet) -> Self {
        Self {
            project: project.to_string(),
            transitions: changes
                .transitions
                .iter()
                .map(|t| {
                    let chunk = t.chunk();
                    TransitionRecord {
                        symbol: chunk.symbol.clone(),
                        file_path: chunk.file_path.clone(),
                        kind: chunk.kind,
                        change: t.change_type(),
                    }
                })
                .collect(),
            unchanged: changes.unchanged,
            skipped_files: Vec::new(),
            orphans_removed: 0,
        }
    }

    pub fn count(&self, change: ChangeType) -> usize {
        self.transitions.iter().filter(|t| t.change == change).count()
    }

    /// True when nothing was created, updated, or deleted.
    pub fn is_noop(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Counts for one project's index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Points in the project's vector collection.
    pub point_count: usize,
    /// Chunks in the project's ledger.
    pub chunk_count: usize,
    /// Distinct files with at least one chunk.
    pub file_count: usize,
}

/// Keeps a project's ledger and vector collection in step with its sources.
pub struct SyncEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    ledgers: Arc<LedgerStore>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("model", &self.embedder.model())
            .field("ledgers", &self.ledgers.dir())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        ledgers: Arc<LedgerStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            ledgers,
        }
    }

    pub fn ledgers(&self) -> &LedgerStore {
        &self.ledgers
    }

    /// Index a batch of files. Files that fail to parse are skipped and
    /// listed in the report; chunks of files outside the batch are kept.
    ///
    /// # Errors
    ///
    /// Embedding or vector store failures abort the sync with the ledger
    /// unchanged. [`ScryError::DeadlineExceeded`] if `deadline` passes
    /// between stages.
    pub async fn sync_full(
        &self,
        project: &str,
        source_path: &str,
        files: &[SourceFile],
        deadline: Deadline,
    ) -> Result<SyncReport, ScryError> {
        let _guard = self.ledgers.lock(project).await?;

        let stored = self.ledgers.load(project)?;
        let dirty = stored
            .as_ref()
            .map_or(true, |l| l.source_path != source_path);
        let mut ledger = stored.unwrap_or_else(|| Ledger::new(project, source_path));
        ledger.source_path = source_path.to_string();

        let batch_paths: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let known = SymbolTable::from_chunks(
            ledger
                .chunks
                .iter()
                .filter(|c| !batch_paths.contains(c.file_path.as_str())),
        );
        let analysis = analyze_sources(files, &known);

        let changes = diff_full_scan(Some(&ledger), project, &analysis.chunks);
        let mut report = SyncReport::new(project, &changes);
        report.skipped_files = analysis.failed.into_iter().map(|(path, _)| path).collect();

        self.commit(ledger, &changes, dirty, deadline).await?;
        log_report(&report);
        Ok(report)
    }

    /// Re-index one file from its full new content.
    ///
    /// A file that fails to parse is skipped (reported, not an error) and
    /// leaves the ledger and vectors untouched.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::sync_full`].
    pub async fn sync_file(
        &self,
        project: &str,
        file_path: &str,
        content: &str,
        deadline: Deadline,
    ) -> Result<SyncReport, ScryError> {
        let file_path = normalize_path(file_path);
        let _guard = self.ledgers.lock(project).await?;

        let stored = self.ledgers.load(project)?;
        let dirty = stored.is_none();
        let ledger = stored.unwrap_or_else(|| Ledger::new(project, ""));

        let context = SymbolTable::from_chunks(
            ledger.chunks.iter().filter(|c| c.file_path != file_path),
        );
        let chunks = match analyze_file(&file_path, content, &context) {
            Ok(chunks) => chunks,
            Err(e @ ScryError::Parse(_)) => {
                tracing::warn!(project, file = %file_path, error = %e, "skipping file that failed to analyze");
                let mut report = SyncReport::new(project, &ChangeSet::default());
                report.skipped_files.push(file_path);
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        let changes = diff_file(&ledger, &file_path, &chunks);
        self.finish_file_sync(project, &file_path, ledger, changes, dirty, deadline)
            .await
    }

    /// Delete every chunk of a file that no longer exists.
    ///
    /// # Errors
    ///
    /// [`ScryError::NoActiveProject`] if the project has no ledger; otherwise
    /// as [`SyncEngine::sync_full`].
    pub async fn sync_file_removed(
        &self,
        project: &str,
        file_path: &str,
        deadline: Deadline,
    ) -> Result<SyncReport, ScryError> {
        let file_path = normalize_path(file_path);
        let _guard = self.ledgers.lock(project).await?;

        let ledger = self.ledgers.load_snapshot(project)?;
        let changes = diff_file(&ledger, &file_path, &[]);
        self.finish_file_sync(project, &file_path, ledger, changes, false, deadline)
            .await
    }

    /// Route a file-change event to the matching sync operation.
    ///
    /// # Errors
    ///
    /// As the operation it routes to.
    pub async fn apply_change(
        &self,
        project: &str,
        change: &FileChange,
        deadline: Deadline,
    ) -> Result<SyncReport, ScryError> {
        match change.kind {
            ChangeKind::Create | ChangeKind::Update => {
                self.sync_file(project, &change.path, &change.content, deadline)
                    .await
            }
            ChangeKind::Delete => self.sync_file_removed(project, &change.path, deadline).await,
        }
    }

    /// Delete the project's points and ledger. Returns whether a ledger
    /// existed.
    ///
    /// The collection itself is dropped only once no other project's points
    /// remain in it.
    ///
    /// # Errors
    ///
    /// Vector store or filesystem failures.
    pub async fn delete_project(&self, project: &str) -> Result<bool, ScryError> {
        let _guard = self.ledgers.lock(project).await?;
        let collection = collection_name(project);
        if self.store.collection_exists(&collection).await? {
            let ids = self.point_ids(&collection, &Filter::project(project)).await?;
            self.store.delete_by_ids(&collection, &ids).await?;
            if self.store.count(&collection, None).await? == 0 {
                self.store.drop_collection(&collection).await?;
            }
        }
        let existed = self.ledgers.remove(project)?;
        tracing::info!(project, existed, "project index deleted");
        Ok(existed)
    }

    /// Point, chunk, and file counts for a project.
    ///
    /// # Errors
    ///
    /// [`ScryError::NoActiveProject`] if the project has no ledger.
    pub async fn stats(&self, project: &str) -> Result<IndexStats, ScryError> {
        let ledger = self.ledgers.load_snapshot(project)?;
        let filter = Filter::project(project);
        let point_count = match self.store.count(&collection_name(project), Some(&filter)).await {
            Ok(n) => n,
            Err(ScryError::CollectionNotFound(_)) => 0,
            Err(e) => return Err(e),
        };
        Ok(IndexStats {
            point_count,
            chunk_count: ledger.chunks.len(),
            file_count: ledger.file_count(),
        })
    }

    async fn finish_file_sync(
        &self,
        project: &str,
        file_path: &str,
        ledger: Ledger,
        changes: ChangeSet,
        dirty: bool,
        deadline: Deadline,
    ) -> Result<SyncReport, ScryError> {
        let mut report = SyncReport::new(project, &changes);
        let ledger = self.commit(ledger, &changes, dirty, deadline).await?;

        // The ledger is already durable; a failed sweep only leaves strays
        // for the next sync of this file to collect.
        match self.sweep_orphans(&ledger, file_path).await {
            Ok(n) => report.orphans_removed = n,
            Err(e) => {
                tracing::warn!(project, file = %file_path, error = %e, "orphan sweep failed")
            }
        }

        log_report(&report);
        Ok(report)
    }

    fn point(&self, project: &str, chunk: &Chunk, vector: Vec<f32>) -> Point {
        Point {
            id: point_id(project, &chunk.key()),
            vector,
            payload: PointPayload::from_chunk(project, chunk),
        }
    }

    async fn commit(
        &self,
        mut ledger: Ledger,
        changes: &ChangeSet,
        dirty: bool,
        deadline: Deadline,
    ) -> Result<Ledger, ScryError> {
        if changes.is_empty() {
            if dirty {
                deadline.check("ledger write")?;
                self.ledgers.persist(&ledger)?;
            }
            return Ok(ledger);
        }

        let project = ledger.project_name.clone();
        let collection = collection_name(&project);

        deadline.check("embedding")?;
        let texts: Vec<String> = changes.needs_embedding().map(Chunk::embedding_text).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(ScryError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let mut vectors = vectors.into_iter();

        let mut deletes = Vec::new();
        let mut replaced = Vec::new();
        let mut replacements = Vec::new();
        let mut creations = Vec::new();
        for transition in &changes.transitions {
            tracing::debug!(
                project = %project,
                symbol = %transition.chunk().symbol,
                file = %transition.chunk().file_path,
                change = ?transition.change_type(),
                "transition"
            );
            match transition {
                Transition::Deleted(chunk) => deletes.push(point_id(&project, &chunk.key())),
                Transition::Updated { previous, current } => {
                    let vector = vectors.next().unwrap_or_default();
                    replaced.push(point_id(&project, &previous.key()));
                    replacements.push(self.point(&project, current, vector));
                }
                Transition::Created(chunk) => {
                    let vector = vectors.next().unwrap_or_default();
                    creations.push(self.point(&project, chunk, vector));
                }
            }
        }

        deadline.check("vector mutation")?;
        self.store
            .ensure_collection(&collection, self.embedder.dimensions())
            .await?;
        if !deletes.is_empty() {
            self.store.delete_by_ids(&collection, &deletes).await?;
        }
        if !replacements.is_empty() {
            self.store
                .replace(&collection, &replaced, &replacements)
                .await?;
        }
        if !creations.is_empty() {
            self.store.upsert(&collection, &creations).await?;
        }

        changes.apply(&mut ledger);
        self.ledgers.persist(&ledger)?;
        Ok(ledger)
    }

    /// Delete points for `file_path` that no live ledger chunk owns.
    async fn sweep_orphans(&self, ledger: &Ledger, file_path: &str) -> Result<usize, ScryError> {
        let project = &ledger.project_name;
        let collection = collection_name(project);
        if !self.store.collection_exists(&collection).await? {
            return Ok(0);
        }

        let owned: HashSet<String> = ledger
            .chunks_for_file(file_path)
            .map(|c| point_id(project, &c.key()))
            .collect();
        let filter = Filter::project(project).must(PayloadField::FilePath, file_path);
        let mut orphans = self.point_ids(&collection, &filter).await?;
        orphans.retain(|id| !owned.contains(id));

        if !orphans.is_empty() {
            tracing::warn!(project = %project, file = %file_path, count = orphans.len(), "removing orphaned points");
            self.store.delete_by_ids(&collection, &orphans).await?;
        }
        Ok(orphans.len())
    }

    /// Ids of every point in `collection` matching `filter`.
    async fn point_ids(&self, collection: &str, filter: &Filter) -> Result<Vec<String>, ScryError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .scroll(collection, SCROLL_PAGE, cursor.as_deref(), Some(filter))
                .await?;
            ids.extend(page.points.into_iter().map(|p| p.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }
}

fn log_report(report: &SyncReport) {
    tracing::info!(
        project = %report.project,
        created = report.count(ChangeType::Created),
        updated = report.count(ChangeType::Updated),
        deleted = report.count(ChangeType::Deleted),
        unchanged = report.unchanged,
        skipped = report.skipped_files.len(),
        "sync complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{ScoredPoint, ScrollPage, SqliteStore};
    use async_trait::async_trait;
    use scry_core::LedgerMode;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Deterministic embedder: letter histogram of the text.
    struct Histogram {
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl Histogram {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for Histogram {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ScryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScryError::Embedding("provider down".into()));
            }
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

    struct Fixture {
        _dir: tempfile::TempDir,
        embedder: Arc<Histogram>,
        store: Arc<SqliteStore>,
        engine: SyncEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(Histogram::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let ledgers = Arc::new(LedgerStore::new(dir.path(), LedgerMode::Keyed));
        let engine = SyncEngine::new(embedder.clone(), store.clone(), ledgers);
        Fixture {
            _dir: dir,
            embedder,
            store,
            engine,
        }
    }

    /// SQLite store whose upserts can be slowed down or rejected.
    struct Flaky {
        inner: SqliteStore,
        fail_upserts: AtomicBool,
        upsert_delay_ms: AtomicU64,
    }

    #[async_trait]
    impl VectorStore for Flaky {
        async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), ScryError> {
            self.inner.ensure_collection(name, dimensions).await
        }

        async fn collection_exists(&self, name: &str) -> Result<bool, ScryError> {
            self.inner.collection_exists(name).await
        }

        async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), ScryError> {
            let delay = self.upsert_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(ScryError::VectorStore("write rejected".into()));
            }
            self.inner.upsert(name, points).await
        }

        async fn delete_by_ids(&self, name: &str, ids: &[String]) -> Result<(), ScryError> {
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

    fn flaky_fixture() -> (tempfile::TempDir, Arc<Flaky>, SyncEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Flaky {
            inner: SqliteStore::in_memory().unwrap(),
            fail_upserts: AtomicBool::new(false),
            upsert_delay_ms: AtomicU64::new(0),
        });
        let ledgers = Arc::new(LedgerStore::new(dir.path(), LedgerMode::Keyed));
        let engine = SyncEngine::new(Arc::new(Histogram::new()), store.clone(), ledgers);
        (dir, store, engine)
    }

    const TOAST: &str = "export function showToast(msg) {\n  render(msg);\n}\n\nexport function hideToast() {\n  render(null);\n}\n";

    #[tokio::test]
    async fn full_sync_is_idempotent() {
        let f = fixture();
        let files = vec![SourceFile::new("ui/toast.js", TOAST)];

        let first = f.engine.sync_full("shop", "/src", &files, Deadline::none()).await.unwrap();
        assert_eq!(first.count(ChangeType::Created), 2);

        let second = f.engine.sync_full("shop", "/src", &files, Deadline::none()).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);

        let stats = f.engine.stats("shop").await.unwrap();
        assert_eq!(stats, IndexStats { point_count: 2, chunk_count: 2, file_count: 1 });
    }

    #[tokio::test]
    async fn embedding_failure_leaves_ledger_untouched_and_retry_converges() {
        let f = fixture();
        let files = vec![SourceFile::new("ui/toast.js", TOAST)];
        f.engine.sync_full("shop", "/src", &files, Deadline::none()).await.unwrap();
        let before = f.engine.ledgers().load_snapshot("shop").unwrap();

        let edited = TOAST.replace("render(msg);", "render(msg, 3000);");
        f.embedder.fail.store(true, Ordering::SeqCst);
        let err = f
            .engine
            .sync_file("shop", "ui/toast.js", &edited, Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ScryError::Embedding(_)));
        assert_eq!(f.engine.ledgers().load_snapshot("shop").unwrap(), before);

        f.embedder.fail.store(false, Ordering::SeqCst);
        let retry = f
            .engine
            .sync_file("shop", "ui/toast.js", &edited, Deadline::none())
            .await
            .unwrap();
        assert_eq!(retry.count(ChangeType::Updated), 1);
        assert_eq!(f.store.count("scry_shop", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn parse_failure_skips_file_without_deleting() {
        let f = fixture();
        let files = vec![SourceFile::new("ui/toast.js", TOAST)];
        f.engine.sync_full("shop", "/src", &files, Deadline::none()).await.unwrap();

        let report = f
            .engine
            .sync_file("shop", "ui/toast.js", "export function showToast( {", Deadline::none())
            .await
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(report.skipped_files, vec!["ui/toast.js"]);
        assert_eq!(f.engine.stats("shop").await.unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn removed_file_deletes_its_points() {
        let f = fixture();
        let files = vec![
            SourceFile::new("ui/toast.js", TOAST),
            SourceFile::new("utils/date.js", "export function formatDate(d) { return d; }"),
        ];
        f.engine.sync_full("shop", "/src", &files, Deadline::none()).await.unwrap();

        let change = FileChange {
            path: "ui/toast.js".into(),
            content: String::new(),
            kind: ChangeKind::Delete,
        };
        let report = f.engine.apply_change("shop", &change, Deadline::none()).await.unwrap();
        assert_eq!(report.count(ChangeType::Deleted), 2);
        let stats = f.engine.stats("shop").await.unwrap();
        assert_eq!(stats, IndexStats { point_count: 1, chunk_count: 1, file_count: 1 });
    }

    #[tokio::test]
    async fn removing_from_unknown_project_is_no_active_project() {
        let f = fixture();
        let err = f
            .engine
            .sync_file_removed("ghost", "a.js", Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ScryError::NoActiveProject(_)));
    }

    #[tokio::test]
    async fn orphaned_points_are_swept() {
        let f = fixture();
        f.engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();

        // A point left behind by an interrupted earlier sync.
        let stray = Chunk {
            symbol: "oldToast".into(),
            file_path: "ui/toast.js".into(),
            kind: ChunkKind::Function,
            line_range: scry_core::LineRange::new(1, 1),
            calls: vec![],
            content: "function oldToast() {}".into(),
        };
        f.store
            .upsert("scry_shop", &[f.engine.point("shop", &stray, vec![1.0; 26])])
            .await
            .unwrap();
        assert_eq!(f.store.count("scry_shop", None).await.unwrap(), 3);

        let report = f
            .engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(f.store.count("scry_shop", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_deadline_aborts_before_any_work() {
        let f = fixture();
        let past = Deadline::at(std::time::Instant::now() - std::time::Duration::from_millis(1));
        let err = f
            .engine
            .sync_file("shop", "ui/toast.js", TOAST, past)
            .await
            .unwrap_err();
        assert!(matches!(err, ScryError::DeadlineExceeded("embedding")));
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
        assert!(f.engine.ledgers().load("shop").unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_project_drops_everything() {
        let f = fixture();
        f.engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        assert!(f.engine.delete_project("shop").await.unwrap());
        assert!(!f.store.collection_exists("scry_shop").await.unwrap());
        assert!(matches!(
            f.engine.stats("shop").await,
            Err(ScryError::NoActiveProject(_))
        ));
    }

    #[tokio::test]
    async fn projects_sharing_a_collection_are_kept_apart() {
        let f = fixture();
        assert_eq!(collection_name("Shop"), collection_name("shop"));
        f.engine
            .sync_file("Shop", "ui/toast.js", "export function showToast(msg) { return msg; }", Deadline::none())
            .await
            .unwrap();
        f.engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        let only_upper = IndexStats { point_count: 1, chunk_count: 1, file_count: 1 };
        assert_eq!(f.engine.stats("Shop").await.unwrap(), only_upper);

        assert!(f.engine.delete_project("shop").await.unwrap());
        assert!(f.store.collection_exists("scry_shop").await.unwrap());
        assert_eq!(f.engine.stats("Shop").await.unwrap(), only_upper);

        assert!(f.engine.delete_project("Shop").await.unwrap());
        assert!(!f.store.collection_exists("scry_shop").await.unwrap());
    }

    #[tokio::test]
    async fn deadline_passing_during_vector_writes_still_records_ledger() {
        let (_dir, store, engine) = flaky_fixture();
        engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();

        let edited = TOAST.replace("render(msg);", "renderLater(msg, 3000);");
        store.upsert_delay_ms.store(200, Ordering::SeqCst);
        let report = engine
            .sync_file("shop", "ui/toast.js", &edited, Deadline::after(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(report.count(ChangeType::Updated), 1);
        store.upsert_delay_ms.store(0, Ordering::SeqCst);

        let ledger = engine.ledgers().load_snapshot("shop").unwrap();
        let recorded = ledger.chunks.iter().find(|c| c.symbol == "showToast").unwrap();
        assert!(recorded.content.contains("renderLater"));
        let filter = Filter::project("shop").must(PayloadField::Symbol, "showToast");
        let page = store.scroll("scry_shop", 10, None, Some(&filter)).await.unwrap();
        assert_eq!(page.points[0].payload.content, recorded.content);

        // Going back to the old content is a real change again.
        let revert = engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        assert_eq!(revert.count(ChangeType::Updated), 1);
    }

    #[tokio::test]
    async fn store_failure_leaves_ledger_untouched() {
        let (_dir, store, engine) = flaky_fixture();
        engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        let before = engine.ledgers().load_snapshot("shop").unwrap();

        let grown = format!("{TOAST}\nexport function flashToast() {{\n  render('!');\n}}\n");
        store.fail_upserts.store(true, Ordering::SeqCst);
        let err = engine
            .sync_file("shop", "ui/toast.js", &grown, Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ScryError::VectorStore(_)));
        assert_eq!(engine.ledgers().load_snapshot("shop").unwrap(), before);
        assert_eq!(store.count("scry_shop", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_replace_converges_on_retry() {
        let (_dir, store, engine) = flaky_fixture();
        engine
            .sync_file("shop", "ui/toast.js", TOAST, Deadline::none())
            .await
            .unwrap();
        let before = engine.ledgers().load_snapshot("shop").unwrap();

        let edited = TOAST.replace("render(msg);", "render(msg, 3000);");
        store.fail_upserts.store(true, Ordering::SeqCst);
        let err = engine
            .sync_file("shop", "ui/toast.js", &edited, Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ScryError::VectorStore(_)));
        // The delete half of the replace went through; the ledger did not move.
        assert_eq!(store.count("scry_shop", None).await.unwrap(), 1);
        assert_eq!(engine.ledgers().load_snapshot("shop").unwrap(), before);

        store.fail_upserts.store(false, Ordering::SeqCst);
        let retry = engine
            .sync_file("shop", "ui/toast.js", &edited, Deadline::none())
            .await
            .unwrap();
        assert_eq!(retry.count(ChangeType::Updated), 1);
        let stats = engine.stats("shop").await.unwrap();
        assert_eq!(stats, IndexStats { point_count: 2, chunk_count: 2, file_count: 1 });
    }
}
