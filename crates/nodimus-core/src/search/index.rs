//! Full-text search index
//!
//! The index lives in its own SQLite database (FTS5, porter stemming) inside a
//! directory next to the relational store. It is a derived cache: nothing in
//! it is authoritative, and it can always be rebuilt from the memories table.
//! Writes here are never part of a relational transaction.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::query::sanitize_fts5_query;
use crate::storage::{Result, StorageError};

/// Suffix appended to the relational store path to locate the index directory
pub const INDEX_DIR_SUFFIX: &str = ".index";

/// Database file inside the index directory
const INDEX_FILE: &str = "documents.db";

// rowid is the memory id; doc_id keeps the stringified key
const DOCUMENTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS documents USING fts5(
    doc_id UNINDEXED,
    body,
    tokenize='porter unicode61'
);
"#;

/// A ranked index match
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Memory id the document is keyed by
    pub id: i64,
    /// BM25 relevance, higher is better
    pub score: f64,
}

/// Search index handle
///
/// Reads and writes go through one connection, so index writes are
/// serialized while the relational store keeps its own locking.
pub struct SearchIndex {
    conn: Mutex<Connection>,
}

impl SearchIndex {
    /// Index directory for a relational store path
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut path = db_path.as_os_str().to_owned();
        path.push(INDEX_DIR_SUFFIX);
        PathBuf::from(path)
    }

    /// Open the index at `dir`, creating it if absent
    ///
    /// A missing directory is created. A directory holding a corrupt index is
    /// a fatal open error.
    pub fn open(dir: &Path) -> Result<Self> {
        if dir.exists() && !dir.is_dir() {
            return Err(StorageError::Index(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        let created = !dir.exists();
        std::fs::create_dir_all(dir)?;

        let open_err = |e: rusqlite::Error| {
            StorageError::Index(format!("failed to open index at {}: {}", dir.display(), e))
        };

        let conn = Connection::open(dir.join(INDEX_FILE)).map_err(open_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(open_err)?;

        let status: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(open_err)?;
        if status != "ok" {
            return Err(StorageError::Index(format!(
                "index at {} is corrupt: {}",
                dir.display(),
                status
            )));
        }

        conn.execute_batch(DOCUMENTS_TABLE).map_err(open_err)?;

        info!(path = %dir.display(), created, "Search index opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Index("Index lock poisoned".into()))
    }

    fn upsert(conn: &Connection, id: i64, content: &str) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM documents WHERE rowid = ?1", params![id])?;
        conn.execute(
            "INSERT INTO documents (rowid, doc_id, body) VALUES (?1, ?2, ?3)",
            params![id, id.to_string(), content],
        )?;
        Ok(())
    }

    /// Insert or replace the document for memory `id`
    pub fn index_document(&self, id: i64, content: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::index)?;
        Self::upsert(&tx, id, content).map_err(StorageError::index)?;
        tx.commit().map_err(StorageError::index)?;
        debug!(memory_id = id, "Indexed document");
        Ok(())
    }

    /// Ranked matches for free-text `query`
    ///
    /// Ordered by descending BM25 score; equal scores fall back to ascending
    /// memory id, i.e. insertion order. A query with no searchable terms
    /// matches nothing.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>> {
        let Some(expr) = sanitize_fts5_query(query) else {
            return Ok(vec![]);
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT rowid, bm25(documents) FROM documents
                 WHERE documents MATCH ?1
                 ORDER BY bm25(documents), rowid
                 LIMIT ?2",
            )
            .map_err(StorageError::index)?;

        let hits = stmt
            .query_map(params![expr, limit as i64], |row| {
                Ok(IndexHit {
                    id: row.get(0)?,
                    // bm25() is negative; more negative is more relevant
                    score: -row.get::<_, f64>(1)?,
                })
            })
            .map_err(StorageError::index)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::index)?;

        Ok(hits)
    }

    /// Whether a document exists for memory `id`
    pub fn contains(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE rowid = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(StorageError::index)?;
        Ok(count > 0)
    }

    pub fn document_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(StorageError::index)
    }

    /// Memory ids of every document, ascending
    pub fn document_ids(&self) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT rowid FROM documents ORDER BY rowid")
            .map_err(StorageError::index)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(StorageError::index)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(StorageError::index)?;
        Ok(ids)
    }

    /// Replace the whole index with the documents returned by `load`
    ///
    /// `load` runs while the index lock is held. A writer that commits after
    /// `load` has read its rows blocks on the lock and re-indexes afterwards,
    /// so no committed memory is lost to the rebuild.
    pub fn replace_all<F>(&self, load: F) -> Result<usize>
    where
        F: FnOnce() -> Result<Vec<(i64, String)>>,
    {
        let mut conn = self.lock()?;
        let documents = load()?;

        let tx = conn.transaction().map_err(StorageError::index)?;
        tx.execute_batch(DOCUMENTS_TABLE).map_err(StorageError::index)?;
        tx.execute("DELETE FROM documents", [])
            .map_err(StorageError::index)?;
        for (id, content) in &documents {
            Self::upsert(&tx, *id, content).map_err(StorageError::index)?;
        }
        tx.commit().map_err(StorageError::index)?;

        Ok(documents.len())
    }

    /// Close the index connection, surfacing any failure
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| StorageError::index(e))
    }

    /// Drop the documents table so every later write fails
    #[cfg(test)]
    pub(crate) fn break_for_tests(&self) {
        self.lock()
            .unwrap()
            .execute_batch("DROP TABLE documents;")
            .unwrap();
    }
}
