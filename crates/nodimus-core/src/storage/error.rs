//! Storage error types

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Schema could not be applied; fatal at startup
    #[error("Schema error: {0}")]
    Schema(String),
    /// The relational store reported corruption; fatal at startup
    #[error("Integrity check failed: {0}")]
    Integrity(String),
    /// A relational write failed and was rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),
    /// Search index write, query or open failed
    #[error("Search index error: {0}")]
    Index(String),
    /// Point lookup miss
    #[error("Memory not found: {0}")]
    NotFound(i64),
    /// Snapshot attempt failed; the next scheduled run retries
    #[error("Snapshot error: {0}")]
    Snapshot(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl StorageError {
    /// A lookup miss is an expected outcome, not a system fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub(crate) fn transaction(err: rusqlite::Error) -> Self {
        StorageError::Transaction(err.to_string())
    }

    pub(crate) fn index(err: rusqlite::Error) -> Self {
        StorageError::Index(err.to_string())
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failure while closing the repository
///
/// Both handles are always closed; each half reports its own failure so a
/// partial close is never hidden behind the other half's success.
#[derive(Debug, Default)]
pub struct CloseError {
    /// Relational store close failure
    pub relational: Option<StorageError>,
    /// Search index close failure
    pub index: Option<StorageError>,
}

impl CloseError {
    pub fn is_partial(&self) -> bool {
        self.relational.is_some() != self.index.is_some()
    }
}

impl std::fmt::Display for CloseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.relational, &self.index) {
            (Some(r), Some(i)) => write!(f, "failed to close relational store ({}) and search index ({})", r, i),
            (Some(r), None) => write!(f, "failed to close relational store ({}); search index closed", r),
            (None, Some(i)) => write!(f, "failed to close search index ({}); relational store closed", i),
            (None, None) => write!(f, "close failed"),
        }
    }
}

impl std::error::Error for CloseError {}
