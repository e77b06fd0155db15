//! Database Schema
//!
//! Versionless schema for the relational store. Every statement is guarded by
//! `IF NOT EXISTS`, so `migrate` can run against a fresh or an already
//! migrated database any number of times.

use rusqlite::Connection;

use super::error::{Result, StorageError};

/// Schema objects, applied in order
pub const SCHEMA: &[SchemaObject] = &[
    SchemaObject {
        name: "memories",
        sql: MEMORIES_TABLE,
    },
    SchemaObject {
        name: "entities",
        sql: ENTITIES_TABLE,
    },
    SchemaObject {
        name: "relationships",
        sql: RELATIONSHIPS_TABLE,
    },
    SchemaObject {
        name: "memory_entities",
        sql: MEMORY_ENTITIES_TABLE,
    },
];

/// A group of idempotent DDL statements
#[derive(Debug, Clone)]
pub struct SchemaObject {
    /// Table the statements create
    pub name: &'static str,
    /// SQL to apply
    pub sql: &'static str,
}

// AUTOINCREMENT keeps memory ids monotonic even if rows are removed externally.
const MEMORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL
);
"#;

const ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL DEFAULT 'unknown'
);
"#;

const RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES entities(id),
    target_id INTEGER NOT NULL REFERENCES entities(id),
    type TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
"#;

const MEMORY_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS memory_entities (
    memory_id INTEGER NOT NULL REFERENCES memories(id),
    entity_id INTEGER NOT NULL REFERENCES entities(id),
    PRIMARY KEY (memory_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_memory_entities_entity ON memory_entities(entity_id);
"#;

/// Apply the schema
///
/// Returns the number of schema objects applied. Any failure (corrupt or
/// read-only store) is a `StorageError::Schema` and must abort startup.
pub fn migrate(conn: &Connection) -> Result<usize> {
    let mut applied = 0;

    for object in SCHEMA {
        tracing::debug!(table = object.name, "Applying schema object");
        conn.execute_batch(object.sql).map_err(|e| {
            StorageError::Schema(format!("failed to apply '{}': {}", object.name, e))
        })?;
        applied += 1;
    }

    Ok(applied)
}

/// Count user-created schema objects (tables and indexes)
pub fn schema_object_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master
         WHERE type IN ('table', 'index') AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
