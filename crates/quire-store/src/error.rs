use std::path::PathBuf;

/// Errors from storage adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file could not be decoded.
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A decoded item is not a valid record.
    #[error("invalid record in {location}: {reason}")]
    InvalidRecord { location: String, reason: String },

    /// Directory traversal failed.
    #[error("cannot walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    /// Storage backend is read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// Failure reported by a custom backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
