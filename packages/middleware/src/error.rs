//! Error types for the bundled middleware.

use thiserror::Error;

/// Errors raised by devtools operations.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// No history entry at the given index.
    #[error("no recorded action at index {index} (history has {len})")]
    NoSuchRecord { index: usize, len: usize },

    /// The entry was recorded without a state snapshot.
    #[error("action {index} was recorded without state")]
    StateNotRecorded { index: usize },

    /// A middleware aborted a devtools-driven dispatch.
    #[error("dispatch of {label} was aborted by middleware")]
    Aborted { label: String },

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] storetree_core::Error),

    /// JSON encoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for middleware operations.
pub type Result<T> = std::result::Result<T, MiddlewareError>;
