//! Search Module
//!
//! Full-text search over memory content:
//! - FTS5 index kept in its own database beside the relational store
//! - BM25 ranking with a stable insertion-order tie-break
//! - Query sanitization so user text is never parsed as FTS5 syntax

mod index;
mod query;

pub use index::{IndexHit, SearchIndex, INDEX_DIR_SUFFIX};
pub use query::sanitize_fts5_query;
