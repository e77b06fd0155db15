//! Memory module - Core types and data structures
//!
//! The repository persists three kinds of rows:
//! - Memories: short text content, the primary retrievable object
//! - Entities: named things referenced by memories, deduplicated by name
//! - Relationships: typed directed edges between two entities

use serde::{Deserialize, Serialize};

/// Entity type assigned to entities created implicitly by `add_memory`
pub const UNKNOWN_ENTITY_TYPE: &str = "unknown";

// ============================================================================
// ROWS
// ============================================================================

/// A stored memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub content: String,
}

/// A named entity, unique by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// A typed, directed edge between two entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

// ============================================================================
// WRITE RESULTS
// ============================================================================

/// Whether a committed memory reached the search index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexStatus {
    /// The search document was written after the relational commit
    Indexed,
    /// The relational commit succeeded but the index write failed.
    /// The memory is retrievable by id and queued for re-indexing.
    Pending { reason: String },
}

impl IndexStatus {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IndexStatus::Indexed)
    }
}

/// Outcome of a successful `add_memory`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMemoryResult {
    /// Id assigned by the relational store
    pub id: i64,
    /// Index outcome; `Pending` is a degraded success, not a failure
    pub index: IndexStatus,
}

// ============================================================================
// SEARCH RESULTS
// ============================================================================

/// A search hit resolved against the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    /// Relevance score, higher is better
    pub score: f64,
    pub content: String,
}

/// Ranked search results
///
/// Index hits whose memory row no longer exists are skipped and reported in
/// `orphaned`, so `hits.len()` may be smaller than the number of index matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Hits in descending relevance order
    pub hits: Vec<SearchHit>,
    /// Index document ids with no backing memory row
    pub orphaned: Vec<i64>,
}

impl SearchResults {
    /// Contents in relevance order
    pub fn contents(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.content.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Row counts plus the size of the not-yet-searchable window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub memories: i64,
    pub entities: i64,
    pub relationships: i64,
    pub indexed_documents: i64,
    /// Memories committed but not yet written to the search index
    pub pending_index: usize,
}
