//! Executor error types.

use thiserror::Error;

/// Errors on the executor plane. Configuration and process-start failures
/// are fatal for the task; join failures are per-peer and survivable.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("task payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("process error: {0}")]
    Process(String),

    #[error("explorer error: {0}")]
    Explorer(String),

    #[error("join refused by peer {0}")]
    JoinRefused(String),

    #[error("coordination error: {0}")]
    State(#[from] riakgrid_state::StateError),

    #[error("driver error: {0}")]
    Driver(#[from] riakgrid_core::DriverError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
