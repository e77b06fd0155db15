//! # Nodimus Core
//!
//! Memory repository for AI assistants: short textual memories linked to
//! named entities, retrievable by id and by full-text relevance.
//!
//! - **Relational store**: SQLite (WAL) holding memories, entities,
//!   relationships and memory-entity links
//! - **Search index**: a separate FTS5 database with BM25 ranking, treated as
//!   a rebuildable cache of the relational store
//! - **Integrity checks**: structural and referential self-check at startup
//! - **Snapshots**: daily online `VACUUM INTO` copies, written atomically
//! - **Knowledge graph**: JSON-LD export of entities and relationships
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nodimus_core::Repository;
//!
//! let repo = Repository::open("/tmp/nodimus/nodimus-memory.db")?;
//!
//! let added = repo.add_memory("Paris is the capital of France", &["Paris", "France"])?;
//! assert_eq!(repo.get_memory(added.id)?, "Paris is the capital of France");
//!
//! let hits = repo.search_memories("capital")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite from source
//! - `encryption`: SQLCipher, keyed by `NODIMUS_ENCRYPTION_KEY`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod graph;
pub mod memory;
pub mod search;
pub mod snapshot;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use memory::{
    AddMemoryResult, Entity, IndexStatus, Memory, Relationship, RepositoryStats, SearchHit,
    SearchResults, UNKNOWN_ENTITY_TYPE,
};

pub use storage::{
    check_file, integrity_check, migrate, CloseError, Repository, Result, StorageError,
    DEFAULT_SEARCH_LIMIT,
};

pub use search::{sanitize_fts5_query, IndexHit, SearchIndex, INDEX_DIR_SUFFIX};

pub use snapshot::{
    snapshot_path, SnapshotScheduler, SnapshotSource, SnapshotState, DEFAULT_SNAPSHOT_INTERVAL,
    SNAPSHOT_DIR,
};

pub use graph::{GraphSource, GRAPH_FILE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the relational store inside the data directory
pub const DATABASE_FILE: &str = "nodimus-memory.db";
