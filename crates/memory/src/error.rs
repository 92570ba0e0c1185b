//! Memory-layer error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedding length differs from the store's configured dimension.
    #[error("embedding has {found} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    /// A stored row could not be turned back into a record.
    #[error("corrupt {table} row '{id}': {message}")]
    Corrupt {
        table: &'static str,
        id: String,
        message: String,
    },
}
