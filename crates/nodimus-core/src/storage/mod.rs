//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Idempotent schema for memories, entities, relationships and links
//! - Relational-first dual writes into the FTS5 search index
//! - Startup integrity checks
//! - Online `VACUUM INTO` snapshots

mod error;
mod integrity;
mod repository;
mod schema;

pub use error::{CloseError, Result, StorageError};
pub use integrity::{check_file, integrity_check};
pub use repository::{Repository, DEFAULT_SEARCH_LIMIT};
pub use schema::{migrate, schema_object_count, SchemaObject, SCHEMA};
