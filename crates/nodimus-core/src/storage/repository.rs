//! Repository
//!
//! Coordinates the relational store and the search index.
//!
//! Writes are relational-first, index-second. The index write happens after
//! the commit, so a failure there leaves a memory that is retrievable by id
//! but not yet searchable. Such ids are tracked as pending and can be retried
//! (`retry_pending_index`) or repaired wholesale (`rebuild_index`). The
//! reverse order could leave index documents with no memory behind them,
//! which is the worse failure for callers.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use super::error::{CloseError, Result, StorageError};
use super::integrity;
use super::schema;
use crate::memory::{
    AddMemoryResult, Entity, IndexStatus, Memory, Relationship, RepositoryStats, SearchHit,
    SearchResults, UNKNOWN_ENTITY_TYPE,
};
use crate::search::SearchIndex;

/// Maximum hits returned by `search` / `search_memories`
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

// ============================================================================
// REPOSITORY
// ============================================================================

/// Memory repository
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, so the repository is `Send + Sync` and callers
/// share it as `Arc<Repository>`.
pub struct Repository {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    index: SearchIndex,
    /// Committed memory ids whose index write failed
    pending: Mutex<BTreeSet<i64>>,
    db_path: PathBuf,
}

impl Repository {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("NODIMUS_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;",
        )?;

        Ok(())
    }

    /// Open (or create) the store at `db_path`
    ///
    /// Runs the schema migration and the integrity check before anything
    /// else; either failing is fatal. The search index is opened at
    /// `db_path` + `.index`. Handles acquired before a failure are dropped
    /// (and thereby closed) on the error path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)
            .map_err(|e| StorageError::Schema(format!("failed to configure store: {}", e)))?;

        schema::migrate(&writer_conn)?;
        integrity::integrity_check(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        let index = SearchIndex::open(&SearchIndex::path_for(&path))?;

        info!(path = %path.display(), "Repository opened");

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            index,
            pending: Mutex::new(BTreeSet::new()),
            db_path: path,
        })
    }

    /// Path of the relational store
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// The search index owned by this repository
    pub fn search_index(&self) -> &SearchIndex {
        &self.index
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    fn pending(&self) -> Result<MutexGuard<'_, BTreeSet<i64>>> {
        self.pending
            .lock()
            .map_err(|_| StorageError::Init("Pending set lock poisoned".into()))
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    /// Store a memory and link it to the named entities
    ///
    /// The memory row, any new entity rows and the links commit in one
    /// transaction; if it fails nothing is visible and the index is not
    /// touched. Duplicate names resolve to one entity. After the commit the
    /// content is indexed; an index failure is reported as
    /// `IndexStatus::Pending` and the id is queued for re-indexing.
    pub fn add_memory<S: AsRef<str>>(
        &self,
        content: &str,
        entity_names: &[S],
    ) -> Result<AddMemoryResult> {
        let id = {
            let mut writer = self.writer()?;
            let tx = writer
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StorageError::transaction)?;
            let id = Self::insert_memory(&tx, content, entity_names)
                .map_err(StorageError::transaction)?;
            tx.commit().map_err(StorageError::transaction)?;
            id
        };

        debug!(memory_id = id, entities = entity_names.len(), "Memory committed");

        let index = match self.index.index_document(id, content) {
            Ok(()) => IndexStatus::Indexed,
            Err(e) => {
                warn!(memory_id = id, "Memory committed but not indexed: {}", e);
                self.pending()?.insert(id);
                IndexStatus::Pending {
                    reason: e.to_string(),
                }
            }
        };

        Ok(AddMemoryResult { id, index })
    }

    fn insert_memory<S: AsRef<str>>(
        tx: &Transaction<'_>,
        content: &str,
        entity_names: &[S],
    ) -> rusqlite::Result<i64> {
        tx.execute("INSERT INTO memories (content) VALUES (?1)", params![content])?;
        let memory_id = tx.last_insert_rowid();

        let mut seen: HashSet<&str> = HashSet::new();
        for name in entity_names {
            let name: &str = name.as_ref();
            if !seen.insert(name) {
                continue;
            }
            // Unique name + DO NOTHING makes lookup-or-insert safe for racing writers
            tx.execute(
                "INSERT INTO entities (name, type) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                params![name, UNKNOWN_ENTITY_TYPE],
            )?;
            let entity_id: i64 = tx.query_row(
                "SELECT id FROM entities WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO memory_entities (memory_id, entity_id) VALUES (?1, ?2)",
                params![memory_id, entity_id],
            )?;
        }

        Ok(memory_id)
    }

    /// Content of memory `id`
    pub fn get_memory(&self, id: i64) -> Result<String> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT content FROM memories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::NotFound(id))
    }

    /// All memories, ascending by id
    pub fn get_all_memories(&self) -> Result<Vec<Memory>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id, content FROM memories ORDER BY id")?;
        let memories = stmt
            .query_map([], |row| {
                Ok(Memory {
                    id: row.get(0)?,
                    content: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(memories)
    }

    /// Entities linked to memory `id`, ascending by entity id
    pub fn get_memory_entities(&self, id: i64) -> Result<Vec<Entity>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT e.id, e.name, e.type FROM entities e
             JOIN memory_entities me ON me.entity_id = e.id
             WHERE me.memory_id = ?1
             ORDER BY e.id",
        )?;
        let entities = stmt
            .query_map(params![id], Self::row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Ranked full-text search, resolved against the relational store
    ///
    /// Index failures are errors, never an empty result. Hits whose memory row
    /// is missing are skipped and listed in `SearchResults::orphaned`; the
    /// remaining hits keep their relevance order.
    pub fn search(&self, query: &str) -> Result<SearchResults> {
        self.search_with_limit(query, DEFAULT_SEARCH_LIMIT)
    }

    /// `search` with an explicit hit limit
    pub fn search_with_limit(&self, query: &str, limit: usize) -> Result<SearchResults> {
        let index_hits = self.index.search(query, limit)?;
        if index_hits.is_empty() {
            return Ok(SearchResults::default());
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare_cached("SELECT content FROM memories WHERE id = ?1")?;

        let mut results = SearchResults::default();
        for hit in index_hits {
            let content: Option<String> = stmt
                .query_row(params![hit.id], |row| row.get(0))
                .optional()?;
            match content {
                Some(content) => results.hits.push(SearchHit {
                    id: hit.id,
                    score: hit.score,
                    content,
                }),
                None => {
                    warn!(memory_id = hit.id, "Search hit has no backing memory, skipping");
                    results.orphaned.push(hit.id);
                }
            }
        }

        Ok(results)
    }

    /// Contents of the memories matching `query`, most relevant first
    pub fn search_memories(&self, query: &str) -> Result<Vec<String>> {
        Ok(self.search(query)?.contents())
    }

    // ========================================================================
    // ENTITIES & RELATIONSHIPS
    // ========================================================================

    fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
        Ok(Entity {
            id: row.get(0)?,
            name: row.get(1)?,
            entity_type: row.get(2)?,
        })
    }

    /// All entities, ascending by id
    pub fn get_entities(&self) -> Result<Vec<Entity>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id, name, type FROM entities ORDER BY id")?;
        let entities = stmt
            .query_map([], Self::row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    /// All relationships, ascending by id
    pub fn get_relationships(&self) -> Result<Vec<Relationship>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, source_id, target_id, type FROM relationships ORDER BY id",
        )?;
        let relationships = stmt
            .query_map([], |row| {
                Ok(Relationship {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    target_id: row.get(2)?,
                    relationship_type: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relationships)
    }

    /// Add a typed edge between two entities
    ///
    /// Endpoints are validated by the store's foreign key constraint only; an
    /// unknown id fails with `StorageError::Transaction` and inserts nothing.
    pub fn add_relationship(
        &self,
        source_id: i64,
        target_id: i64,
        relationship_type: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer
            .execute(
                "INSERT INTO relationships (source_id, target_id, type) VALUES (?1, ?2, ?3)",
                params![source_id, target_id, relationship_type],
            )
            .map_err(StorageError::transaction)?;
        Ok(writer.last_insert_rowid())
    }

    // ========================================================================
    // INDEX MAINTENANCE
    // ========================================================================

    /// Memories committed but not yet searchable
    pub fn pending_index_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Ids currently waiting for an index write
    pub fn pending_index_ids(&self) -> Result<Vec<i64>> {
        Ok(self.pending()?.iter().copied().collect())
    }

    /// Retry index writes for pending memories
    ///
    /// Returns how many became searchable. Ids that still fail stay pending;
    /// ids whose memory row disappeared are dropped.
    pub fn retry_pending_index(&self) -> Result<usize> {
        let ids = self.pending_index_ids()?;
        let mut recovered = 0;

        for id in ids {
            let content = match self.get_memory(id) {
                Ok(content) => content,
                Err(StorageError::NotFound(_)) => {
                    self.pending()?.remove(&id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.index.index_document(id, &content) {
                Ok(()) => {
                    self.pending()?.remove(&id);
                    recovered += 1;
                }
                Err(e) => {
                    debug!(memory_id = id, "Index retry failed: {}", e);
                }
            }
        }

        if recovered > 0 {
            info!(recovered, pending = self.pending_index_count(), "Re-indexed pending memories");
        }
        Ok(recovered)
    }

    /// Rebuild the whole index from the memories table
    ///
    /// Idempotent. Returns the number of documents written. Only the ids the
    /// rebuild loaded leave the pending set; a write that commits after the
    /// load and then fails its index write stays pending.
    pub fn rebuild_index(&self) -> Result<usize> {
        let mut loaded = BTreeSet::new();
        let count = self.index.replace_all(|| {
            let documents: Vec<(i64, String)> = self
                .get_all_memories()?
                .into_iter()
                .map(|m| (m.id, m.content))
                .collect();
            loaded.extend(documents.iter().map(|(id, _)| *id));
            Ok(documents)
        })?;
        self.pending()?.retain(|id| !loaded.contains(id));
        info!(documents = count, "Search index rebuilt");
        Ok(count)
    }

    /// Rebuild the index if its documents disagree with the memories table
    ///
    /// Compares the full id sets, so a missing document hidden by an orphan
    /// one is still caught. This covers memories left unindexed by a crash
    /// between commit and index write, which the in-memory pending set cannot
    /// survive. Content drift under a matching id is not detected; `Reindex`
    /// repairs that. Returns the number of documents written, or `None` if no
    /// rebuild was needed.
    pub fn reconcile_index(&self) -> Result<Option<usize>> {
        let memories = self.memory_ids()?;
        let documents = self.index.document_ids()?;
        if memories == documents {
            return Ok(None);
        }
        warn!(
            memories = memories.len(),
            documents = documents.len(),
            "Search index out of sync, rebuilding"
        );
        self.rebuild_index().map(Some)
    }

    fn memory_ids(&self) -> Result<Vec<i64>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id FROM memories ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // ========================================================================
    // INTEGRITY, SNAPSHOTS & STATS
    // ========================================================================

    /// Run the integrity check against the live store
    pub fn integrity_check(&self) -> Result<()> {
        let reader = self.reader()?;
        integrity::integrity_check(&reader)
    }

    /// Write a consistent copy of the relational store to `path`
    ///
    /// `VACUUM INTO` reads inside one transaction, so concurrent writers are
    /// neither blocked nor partially captured. The copy runs on its own
    /// connection so readers are not held up either. `path` must not exist.
    pub fn snapshot_to(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| StorageError::Snapshot("Invalid snapshot path encoding".to_string()))?;
        // Reject control characters (except tab)
        if path_str.bytes().any(|b| b < 0x20 && b != b'\t') {
            return Err(StorageError::Snapshot(
                "Snapshot path contains invalid characters".to_string(),
            ));
        }
        let conn = Connection::open(&self.db_path)?;
        Self::configure_connection(&conn)?;
        // VACUUM INTO doesn't support parameterized queries; escape single quotes
        conn
            .execute_batch(&format!("VACUUM INTO '{}'", path_str.replace('\'', "''")))
            .map_err(|e| StorageError::Snapshot(e.to_string()))?;
        Ok(())
    }

    fn count(&self, table: &str) -> Result<i64> {
        let reader = self.reader()?;
        let count = reader.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<RepositoryStats> {
        Ok(RepositoryStats {
            memories: self.count("memories")?,
            entities: self.count("entities")?,
            relationships: self.count("relationships")?,
            indexed_documents: self.index.document_count()?,
            pending_index: self.pending_index_count(),
        })
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    /// Close both stores
    ///
    /// Both halves are closed even if one fails; failures are reported per
    /// half in `CloseError`.
    pub fn close(self) -> std::result::Result<(), CloseError> {
        let Repository {
            writer,
            reader,
            index,
            pending,
            db_path,
        } = self;

        let pending = pending.into_inner().map(|p| p.len()).unwrap_or(0);
        if pending > 0 {
            warn!(pending, "Closing with memories not yet indexed");
        }

        let close_conn = |conn: Mutex<Connection>| {
            conn.into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .close()
                .map_err(|(_, e)| StorageError::Database(e))
        };

        let mut err = CloseError::default();
        // Reader first so the writer's close can checkpoint the WAL
        let reader_result = close_conn(reader);
        let writer_result = close_conn(writer);
        err.relational = reader_result.err().or(writer_result.err());
        err.index = index.close().err();

        if err.relational.is_none() && err.index.is_none() {
            info!(path = %db_path.display(), "Repository closed");
            Ok(())
        } else {
            Err(err)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
