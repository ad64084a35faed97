//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur in the scheduler control plane.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("cluster already exists: {0}")]
    ClusterExists(String),

    #[error("state error: {0}")]
    State(#[from] riakgrid_state::StateError),

    #[error("payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("driver error: {0}")]
    Driver(#[from] riakgrid_core::DriverError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
