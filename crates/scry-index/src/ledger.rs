//! Durable per-project chunk ledgers.
//!
//! A ledger is the source of truth for which chunks (and therefore which
//! vector points) a project owns. Ledgers are JSON files written atomically
//! (temp file + rename), so a crash mid-write leaves the previous version.
//!
//! Two layouts are supported:
//! - [`LedgerMode::Keyed`]: one file per project, independent of each other.
//! - [`LedgerMode::SingleActive`]: a single `active.json`; loading a
//!   different project replaces it wholesale.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use scry_core::{Chunk, LedgerConfig, LedgerMode, ScryError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OwnedMutexGuard;

use crate::vector::collection_name;

const ACTIVE_FILE: &str = "active.json";

/// All chunks known for one project.
///
/// # Examples
///
/// ```
/// use scry_index::ledger::Ledger;
///
/// let ledger = Ledger::new("shop", "/src/shop");
/// assert!(ledger.chunks.is_empty());
/// assert_eq!(ledger.file_count(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    pub project_name: String,
    pub source_path: String,
    pub chunks: Vec<Chunk>,
}

impl Ledger {
    pub fn new(project_name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            source_path: source_path.into(),
            chunks: Vec::new(),
        }
    }

    /// Chunks recorded for `file_path`, in ledger order.
    pub fn chunks_for_file<'a>(&'a self, file_path: &'a str) -> impl Iterator<Item = &'a Chunk> {
        self.chunks.iter().filter(move |c| c.file_path == file_path)
    }

    /// Distinct file paths with at least one chunk.
    pub fn files(&self) -> BTreeSet<&str> {
        self.chunks.iter().map(|c| c.file_path.as_str()).collect()
    }

    pub fn file_count(&self) -> usize {
        self.files().len()
    }
}

/// Loads and persists ledgers, and hands out per-project writer locks.
///
/// # Examples
///
/// ```
/// use scry_core::LedgerMode;
/// use scry_index::ledger::{Ledger, LedgerStore};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = LedgerStore::new(dir.path(), LedgerMode::Keyed);
/// store.persist(&Ledger::new("shop", "/src/shop")).unwrap();
/// assert!(store.load("shop").unwrap().is_some());
/// assert!(store.load("blog").unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct LedgerStore {
    dir: PathBuf,
    mode: LedgerMode,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LedgerStore {
    pub fn new(dir: impl Into<PathBuf>, mode: LedgerMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.dir.clone(), config.mode)
    }

    pub fn mode(&self) -> LedgerMode {
        self.mode
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_key(&self, project: &str) -> String {
        match self.mode {
            // Projects whose names share a vector collection share a lock.
            LedgerMode::Keyed => collection_name(project),
            // Every project shares one file, so writers share one lock.
            LedgerMode::SingleActive => String::from(ACTIVE_FILE),
        }
    }

    /// Acquire the writer lock for `project`. Held for the whole
    /// read-modify-write of a sync.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Ledger`] if the lock table is poisoned.
    pub async fn lock(&self, project: &str) -> Result<OwnedMutexGuard<()>, ScryError> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| ScryError::Ledger("ledger lock table poisoned".into()))?;
            locks
                .entry(self.lock_key(project))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        Ok(mutex.lock_owned().await)
    }

    /// Path of the file holding `project`'s ledger.
    pub fn path_for(&self, project: &str) -> PathBuf {
        match self.mode {
            LedgerMode::Keyed => self.dir.join(keyed_file_name(project)),
            LedgerMode::SingleActive => self.dir.join(ACTIVE_FILE),
        }
    }

    fn read(path: &Path) -> Result<Option<Ledger>, ScryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ledger = serde_json::from_str(&content).map_err(|e| {
            ScryError::Ledger(format!("corrupt ledger {}: {e}", path.display()))
        })?;
        Ok(Some(ledger))
    }

    /// Load `project`'s ledger, or `None` if it has never been synced (or,
    /// in single-active mode, another project is active).
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Ledger`] if the file exists but cannot be parsed.
    pub fn load(&self, project: &str) -> Result<Option<Ledger>, ScryError> {
        let ledger = Self::read(&self.path_for(project))?;
        Ok(ledger.filter(|l| l.project_name == project))
    }

    /// Load `project`'s ledger, failing if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::NoActiveProject`] if no ledger exists for it.
    pub fn load_snapshot(&self, project: &str) -> Result<Ledger, ScryError> {
        self.load(project)?
            .ok_or_else(|| ScryError::NoActiveProject(project.to_string()))
    }

    /// Atomically write `ledger`.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Io`] if the directory or file cannot be written.
    pub fn persist(&self, ledger: &Ledger) -> Result<(), ScryError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&ledger.project_name);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(ledger)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(
            project = %ledger.project_name,
            chunks = ledger.chunks.len(),
            path = %path.display(),
            "ledger persisted"
        );
        Ok(())
    }

    /// Remove `project`'s ledger. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::Io`] if the file exists but cannot be removed.
    pub fn remove(&self, project: &str) -> Result<bool, ScryError> {
        if self.load(project)?.is_none() {
            return Ok(false);
        }
        std::fs::remove_file(self.path_for(project))?;
        Ok(true)
    }
}

/// `<slug>-<hash>.json`: readable, and distinct for names that slug alike.
fn keyed_file_name(project: &str) -> String {
    let slug: String = project
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    let digest = format!("{:x}", Sha256::digest(project.as_bytes()));
    format!("{slug}-{}.json", &digest[..12])
}
