//! Integrity Checks
//!
//! Startup self-check of the relational store: SQLite's own structural check
//! plus a referential check, since a relationship pointing at a missing entity
//! is corruption rather than a normal error.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use super::error::{Result, StorageError};

/// Run the integrity check against an open connection
///
/// Fails with `StorageError::Integrity` if SQLite reports any problem or if
/// any foreign key points at a missing row.
pub fn integrity_check(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA integrity_check")
        .map_err(|e| StorageError::Integrity(e.to_string()))?;
    let problems: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| StorageError::Integrity(e.to_string()))?
        .collect::<rusqlite::Result<_>>()
        .map_err(|e| StorageError::Integrity(e.to_string()))?;

    if problems.len() != 1 || problems[0] != "ok" {
        return Err(StorageError::Integrity(problems.join("; ")));
    }

    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .map_err(|e| StorageError::Integrity(e.to_string()))?;
    let dangling: Vec<String> = stmt
        .query_map([], |row| {
            let table: String = row.get(0)?;
            let rowid: Option<i64> = row.get(1)?;
            let parent: String = row.get(2)?;
            Ok(match rowid {
                Some(id) => format!("{} row {} references missing {}", table, id, parent),
                None => format!("{} row references missing {}", table, parent),
            })
        })
        .map_err(|e| StorageError::Integrity(e.to_string()))?
        .collect::<rusqlite::Result<_>>()
        .map_err(|e| StorageError::Integrity(e.to_string()))?;

    if !dangling.is_empty() {
        return Err(StorageError::Integrity(dangling.join("; ")));
    }

    Ok(())
}

/// Open an existing database file and check it
///
/// Used to validate snapshot files. The file is never created; a WAL-mode
/// copy needs write access for its shared-memory index, so it is not opened
/// read-only.
pub fn check_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(StorageError::Integrity(format!(
            "{} is not a database file",
            path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| StorageError::Integrity(e.to_string()))?;
    integrity_check(&conn)
}
