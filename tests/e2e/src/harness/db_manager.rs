//! Test Database Manager
//!
//! Provides isolated repository instances for testing:
//! - Temporary data directories that are automatically cleaned up
//! - Pre-seeded repositories with test data
//! - Close and reopen against the same files
//! - Direct store access for simulating drift between the two stores

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nodimus_core::{Repository, SearchIndex, DATABASE_FILE};
use rusqlite::params;
use tempfile::TempDir;

use crate::mocks::TestDataFactory;

/// Manager for test repositories
///
/// Creates an isolated data directory for each test to prevent interference.
/// The directory is deleted when the manager is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDatabaseManager::new_temp();
///
/// db.repo.add_memory("Paris is the capital of France", &["Paris", "France"])?;
///
/// // Data directory is deleted when `db` goes out of scope
/// ```
pub struct TestDatabaseManager {
    /// The repository
    pub repo: Arc<Repository>,
    /// Temporary directory (kept alive to prevent premature deletion)
    temp_dir: TempDir,
    /// Path to the relational store
    db_path: PathBuf,
}

impl TestDatabaseManager {
    /// Create a new repository in a temporary directory
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join(DATABASE_FILE);
        let repo = Repository::open(&db_path).expect("Failed to open test repository");

        Self {
            repo: Arc::new(repo),
            temp_dir,
            db_path,
        }
    }

    /// Path to the relational store
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Data directory holding the store, the index and snapshots
    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory holding the search index
    pub fn index_dir(&self) -> PathBuf {
        SearchIndex::path_for(&self.db_path)
    }

    pub fn memory_count(&self) -> i64 {
        self.repo.stats().map(|s| s.memories).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.memory_count() == 0
    }

    // ========================================================================
    // SEEDING METHODS
    // ========================================================================

    /// Seed `count` memories, each linked to two topic entities
    pub fn seed_memories(&self, count: usize) -> Vec<i64> {
        TestDataFactory::create_batch(&self.repo, count)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Close the repository and open it again on the same files
    ///
    /// Panics if the repository is still shared.
    pub fn reopen(&mut self) {
        self.close();
        let repo = Repository::open(&self.db_path).expect("Failed to reopen test repository");
        self.repo = Arc::new(repo);
    }

    /// Close the repository, leaving a fresh placeholder in its place
    fn close(&mut self) {
        let placeholder_dir = self.temp_dir.path().join("placeholder");
        let placeholder = Arc::new(
            Repository::open(placeholder_dir.join(DATABASE_FILE))
                .expect("Failed to open placeholder repository"),
        );
        let repo = std::mem::replace(&mut self.repo, placeholder);
        let repo = Arc::try_unwrap(repo)
            .unwrap_or_else(|_| panic!("Repository still shared; drop clones before reopening"));
        repo.close().expect("Failed to close test repository");
    }

    // ========================================================================
    // DRIFT SIMULATION
    // ========================================================================

    /// Delete a memory row directly, leaving its search document behind
    pub fn delete_memory_row(&self, id: i64) {
        let conn = rusqlite::Connection::open(&self.db_path).expect("Failed to open store");
        conn.execute("DELETE FROM memory_entities WHERE memory_id = ?1", params![id])
            .expect("Failed to unlink memory");
        conn.execute("DELETE FROM memories WHERE id = ?1", params![id])
            .expect("Failed to delete memory");
    }

    /// Remove the whole search index directory
    ///
    /// Call after closing the repository; `reopen` recreates an empty index.
    pub fn wipe_index_files(&self) {
        let _ = std::fs::remove_dir_all(self.index_dir());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_database_creation() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().exists());
        assert!(db.index_dir().is_dir());
    }

    #[test]
    fn test_seed_memories() {
        let db = TestDatabaseManager::new_temp();
        let ids = db.seed_memories(10);

        assert_eq!(ids.len(), 10);
        assert_eq!(db.memory_count(), 10);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let mut db = TestDatabaseManager::new_temp();
        let ids = db.seed_memories(3);
        db.reopen();

        assert_eq!(db.memory_count(), 3);
        assert!(db.repo.get_memory(ids[0]).is_ok());
    }

    #[test]
    fn test_delete_memory_row() {
        let db = TestDatabaseManager::new_temp();
        let ids = db.seed_memories(2);
        db.delete_memory_row(ids[0]);

        assert!(db.repo.get_memory(ids[0]).unwrap_err().is_not_found());
        assert_eq!(db.memory_count(), 1);
    }
}
