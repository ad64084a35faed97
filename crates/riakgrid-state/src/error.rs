//! Error types for the state layer.

use thiserror::Error;

/// Result type alias for state and coordination operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors from the coordination service or the records stored in it.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no such node: {0}")]
    NotFound(String),

    #[error("node already exists: {0}")]
    AlreadyExists(String),

    #[error("coordination service error: {0}")]
    Coordination(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
