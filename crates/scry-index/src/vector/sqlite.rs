//! Local vector store on SQLite.
//!
//! Embeddings are stored as little-endian `f32` BLOBs and payloads as JSON.
//! Cosine similarity is computed in Rust over the collection's points, which
//! is plenty for a single project's chunk count.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use scry_core::{PointPayload, ScryError};

use super::{
    cosine_similarity, Filter, Point, ScoredPoint, ScrollPage, StoredPoint, VectorStore,
};

/// SQLite-backed [`VectorStore`].
///
/// # Examples
///
/// ```
/// use scry_index::vector::{SqliteStore, VectorStore};
///
/// # async fn example() {
/// let store = SqliteStore::in_memory().unwrap();
/// store.ensure_collection("scry_shop", 3).await.unwrap();
/// assert_eq!(store.count("scry_shop", None).await.unwrap(), 0);
/// # }
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::VectorStore`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, ScryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ScryError::VectorStore(format!("failed to create store directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| ScryError::VectorStore(format!("failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ScryError::VectorStore`] if schema creation fails.
    pub fn in_memory() -> Result<Self, ScryError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ScryError::VectorStore(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ScryError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimensions INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                payload TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id),
                FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
            );
            ",
        )
        .map_err(|e| ScryError::VectorStore(format!("failed to create schema: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ScryError> {
        self.conn
            .lock()
            .map_err(|_| ScryError::VectorStore("store connection lock poisoned".into()))
    }

    /// Stored dimension of a collection, or `None` if it does not exist.
    fn dimensions(conn: &Connection, name: &str) -> Result<Option<usize>, ScryError> {
        conn.query_row(
            "SELECT dimensions FROM collections WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|dims| dims.map(|d| d as usize))
        .map_err(|e| ScryError::VectorStore(format!("failed to read collection '{name}': {e}")))
    }

    fn require(conn: &Connection, name: &str) -> Result<usize, ScryError> {
        Self::dimensions(conn, name)?.ok_or_else(|| ScryError::CollectionNotFound(name.into()))
    }

    /// All points of a collection matching `filter`, in id order.
    fn load(
        conn: &Connection,
        name: &str,
        filter: Option<&Filter>,
        with_vectors: bool,
    ) -> Result<Vec<(String, PointPayload, Vec<f32>)>, ScryError> {
        let sql = if with_vectors {
            "SELECT id, payload, embedding FROM points WHERE collection = ?1 ORDER BY id"
        } else {
            "SELECT id, payload, NULL FROM points WHERE collection = ?1 ORDER BY id"
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ScryError::VectorStore(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![name], |row| {
                let id: String = row.get(0)?;
                let payload: String = row.get(1)?;
                let embedding: Option<Vec<u8>> = row.get(2)?;
                Ok((id, payload, embedding))
            })
            .map_err(|e| ScryError::VectorStore(format!("failed to query points: {e}")))?;

        let mut points = Vec::new();
        for row in rows {
            let (id, payload, embedding) =
                row.map_err(|e| ScryError::VectorStore(format!("failed to read row: {e}")))?;
            let payload: PointPayload = serde_json::from_str(&payload).map_err(|e| {
                ScryError::VectorStore(format!("corrupt payload for point {id}: {e}"))
            })?;
            if filter.is_some_and(|f| !f.matches(&payload)) {
                continue;
            }
            let vector = embedding.map(|b| bytes_to_floats(&b)).unwrap_or_default();
            points.push((id, payload, vector));
        }
        Ok(points)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), ScryError> {
        let conn = self.conn()?;
        if let Some(stored) = Self::dimensions(&conn, name)? {
            if stored != dimensions {
                return Err(ScryError::VectorStore(format!(
                    "collection '{name}' was created with {stored} dimensions but {dimensions} were requested; drop the index to rebuild"
                )));
            }
            return Ok(());
        }
        conn.execute(
            "INSERT INTO collections (name, dimensions) VALUES (?1, ?2)",
            params![name, dimensions as i64],
        )
        .map_err(|e| ScryError::VectorStore(format!("failed to create collection '{name}': {e}")))?;
        tracing::debug!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ScryError> {
        let conn = self.conn()?;
        Ok(Self::dimensions(&conn, name)?.is_some())
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), ScryError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let dims = Self::require(&conn, name)?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dims) {
            return Err(ScryError::VectorStore(format!(
                "point {} has {} dimensions, collection '{name}' expects {dims}",
                bad.id,
                bad.vector.len()
            )));
        }

        let tx = conn
            .transaction()
            .map_err(|e| ScryError::VectorStore(format!("failed to begin transaction: {e}")))?;
        for point in points {
            let payload = serde_json::to_string(&point.payload)?;
            tx.execute(
                "INSERT OR REPLACE INTO points (collection, id, payload, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, point.id, payload, floats_to_bytes(&point.vector)],
            )
            .map_err(|e| ScryError::VectorStore(format!("failed to upsert point: {e}")))?;
        }
        tx.commit()
            .map_err(|e| ScryError::VectorStore(format!("failed to commit upsert: {e}")))
    }

    async fn delete_by_ids(&self, name: &str, ids: &[String]) -> Result<(), ScryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        Self::require(&conn, name)?;
        let tx = conn
            .transaction()
            .map_err(|e| ScryError::VectorStore(format!("failed to begin transaction: {e}")))?;
        for id in ids {
            tx.execute(
                "DELETE FROM points WHERE collection = ?1 AND id = ?2",
                params![name, id],
            )
            .map_err(|e| ScryError::VectorStore(format!("failed to delete point: {e}")))?;
        }
        tx.commit()
            .map_err(|e| ScryError::VectorStore(format!("failed to commit delete: {e}")))
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, ScryError> {
        let conn = self.conn()?;
        let dims = Self::require(&conn, name)?;
        if vector.len() != dims {
            return Err(ScryError::VectorStore(format!(
                "query vector has {} dimensions, collection '{name}' expects {dims}",
                vector.len()
            )));
        }

        let mut scored: Vec<ScoredPoint> = Self::load(&conn, name, filter, true)?
            .into_iter()
            .map(|(id, payload, embedding)| ScoredPoint {
                score: cosine_similarity(vector, &embedding),
                id,
                payload,
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        cursor: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, ScryError> {
        let conn = self.conn()?;
        Self::require(&conn, name)?;

        let mut remaining = Self::load(&conn, name, filter, false)?
            .into_iter()
            .filter(|(id, _, _)| cursor.map_or(true, |c| id.as_str() >= c))
            .map(|(id, payload, _)| StoredPoint { id, payload });

        let points: Vec<StoredPoint> = remaining.by_ref().take(limit).collect();
        let next_cursor = remaining.next().map(|p| p.id);
        Ok(ScrollPage {
            points,
            next_cursor,
        })
    }

    async fn count(&self, name: &str, filter: Option<&Filter>) -> Result<usize, ScryError> {
        let conn = self.conn()?;
        Self::require(&conn, name)?;
        if filter.is_some() {
            return Ok(Self::load(&conn, name, filter, false)?.len());
        }
        conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
        .map_err(|e| ScryError::VectorStore(format!("failed to count points: {e}")))
    }

    async fn drop_collection(&self, name: &str) -> Result<(), ScryError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM points WHERE collection = ?1", params![name])
            .map_err(|e| ScryError::VectorStore(format!("failed to drop points: {e}")))?;
        conn.execute("DELETE FROM collections WHERE name = ?1", params![name])
            .map_err(|e| ScryError::VectorStore(format!("failed to drop collection: {e}")))?;
        Ok(())
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
