//! The `Scry` facade: public core operations over one configured index.

use std::sync::Arc;

use scry_analyzer::SourceFile;
use scry_core::{Deadline, FileChange, RankedResult, ScryConfig, ScryError, SearchConfig};
use scry_index::{
    open_store, Embedder, IndexStats, LedgerStore, OpenAiEmbedder, SyncEngine, SyncReport,
    VectorStore,
};

use crate::keywords::{KeywordExtractor, LlmKeywordExtractor, LocalKeywordExtractor};
use crate::pipeline::QueryPipeline;

/// Code knowledge index and hybrid retrieval over one vector store and
/// ledger directory.
///
/// Writes for one project are serialized by the ledger store's per-project
/// lock. Queries take no lock and may observe an index mid-update.
#[derive(Debug)]
pub struct Scry {
    sync: SyncEngine,
    pipeline: QueryPipeline,
    query_budget_ms: Option<u64>,
}

impl Scry {
    /// Wire up collaborators from configuration.
    ///
    /// # Errors
    ///
    /// - [`ScryError::Config`] if no embedding API key is available.
    /// - [`ScryError::VectorStore`] if the SQLite store cannot be opened.
    /// - [`ScryError::Keywords`] if the keyword client cannot be built.
    pub fn from_config(config: &ScryConfig) -> Result<Self, ScryError> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(OpenAiEmbedder::with_config(&config.embedding)?);
        let store = open_store(config)?;
        let ledgers = Arc::new(LedgerStore::from_config(&config.ledger));
        let keywords: Arc<dyn KeywordExtractor> = if config.keywords.enabled {
            Arc::new(LlmKeywordExtractor::new(&config.keywords)?)
        } else {
            Arc::new(LocalKeywordExtractor)
        };
        Ok(Self::new(embedder, store, ledgers, keywords, config.search.clone()))
    }

    /// Assemble from explicit collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        ledgers: Arc<LedgerStore>,
        keywords: Arc<dyn KeywordExtractor>,
        search: SearchConfig,
    ) -> Self {
        let query_budget_ms = search.deadline_ms;
        Self {
            sync: SyncEngine::new(embedder.clone(), store.clone(), ledgers),
            pipeline: QueryPipeline::new(embedder, store, keywords, search),
            query_budget_ms,
        }
    }

    pub fn ledgers(&self) -> &LedgerStore {
        self.sync.ledgers()
    }

    /// Index a batch of files for `project` rooted at `source_path`.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_full`].
    pub async fn sync_full(
        &self,
        project: &str,
        source_path: &str,
        files: &[SourceFile],
    ) -> Result<SyncReport, ScryError> {
        self.sync
            .sync_full(project, source_path, files, Deadline::none())
            .await
    }

    /// Re-index one file from its full content.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_file`].
    pub async fn sync_file(
        &self,
        project: &str,
        file_path: &str,
        content: &str,
    ) -> Result<SyncReport, ScryError> {
        self.sync
            .sync_file(project, file_path, content, Deadline::none())
            .await
    }

    /// Drop every chunk of a deleted file.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_file_removed`].
    pub async fn sync_file_removed(
        &self,
        project: &str,
        file_path: &str,
    ) -> Result<SyncReport, ScryError> {
        self.sync
            .sync_file_removed(project, file_path, Deadline::none())
            .await
    }

    /// Apply a file-change event.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::apply_change`].
    pub async fn apply_change(
        &self,
        project: &str,
        change: &FileChange,
    ) -> Result<SyncReport, ScryError> {
        self.sync.apply_change(project, change, Deadline::none()).await
    }

    /// Ranked chunks for `text`, using the configured per-query budget.
    ///
    /// # Errors
    ///
    /// See [`Scry::query_with_deadline`].
    pub async fn query(&self, project: &str, text: &str) -> Result<Vec<RankedResult>, ScryError> {
        self.query_with_deadline(project, text, Deadline::from_millis(self.query_budget_ms))
            .await
    }

    /// Ranked chunks for `text`, stopping between stages once `deadline`
    /// passes.
    ///
    /// # Errors
    ///
    /// - [`ScryError::NoActiveProject`] if `project` has no ledger.
    /// - [`ScryError::CollectionNotFound`] if its collection is missing.
    /// - [`ScryError::Embedding`] or [`ScryError::VectorStore`] on
    ///   collaborator failure; never partial results.
    /// - [`ScryError::DeadlineExceeded`].
    pub async fn query_with_deadline(
        &self,
        project: &str,
        text: &str,
        deadline: Deadline,
    ) -> Result<Vec<RankedResult>, ScryError> {
        if self.sync.ledgers().load(project)?.is_none() {
            return Err(ScryError::NoActiveProject(project.to_string()));
        }
        self.pipeline.run(project, text, deadline).await
    }

    /// Remove the project's vector collection and ledger. Returns whether
    /// a ledger existed.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::delete_project`].
    pub async fn delete_project_index(&self, project: &str) -> Result<bool, ScryError> {
        self.sync.delete_project(project).await
    }

    /// Point, chunk, and file counts.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::stats`].
    pub async fn stats(&self, project: &str) -> Result<IndexStats, ScryError> {
        self.sync.stats(project).await
    }
}
