//! Driver surface of the cluster manager.
//!
//! The manager's wire protocol stays external; the framework consumes it
//! through two narrow traits plus two event sum types. Callbacks arrive as
//! `SchedulerEvent` / `ExecutorEvent` values on a single channel and are
//! handled sequentially, so event order equals effect order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    ExecutorId, Filters, FrameworkId, MasterInfo, Offer, OfferId, TaskId, TaskInfo, TaskStatus,
    WorkerId,
};

/// Errors surfaced by a driver implementation.
///
/// The framework never retries a manager RPC itself; retries belong to the
/// driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver transport error: {0}")]
    Transport(String),

    #[error("driver is not connected")]
    NotConnected,

    #[error("driver stopped")]
    Stopped,
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Everything the cluster manager can tell a scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Registered {
        framework_id: FrameworkId,
        master: MasterInfo,
    },
    Reregistered {
        master: MasterInfo,
    },
    Disconnected,
    ResourceOffers(Vec<Offer>),
    StatusUpdate(TaskStatus),
    OfferRescinded(OfferId),
    FrameworkMessage {
        executor_id: ExecutorId,
        worker_id: WorkerId,
        data: Vec<u8>,
    },
    WorkerLost(WorkerId),
    ExecutorLost {
        executor_id: ExecutorId,
        worker_id: WorkerId,
        status: i32,
    },
    Error(String),
}

/// Everything the cluster manager can tell an executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ExecutorEvent {
    LaunchTask(TaskInfo),
    KillTask(TaskId),
    Shutdown,
}

/// Outbound calls available to the scheduler plane.
#[async_trait]
pub trait SchedulerDriver: Send + Sync {
    /// Launch tasks against the given offers. An empty task list declines
    /// the offers; the unmatched remainder of a matched offer is declined
    /// implicitly by the manager.
    async fn launch_tasks(
        &self,
        offer_ids: &[OfferId],
        tasks: Vec<TaskInfo>,
        filters: Filters,
    ) -> DriverResult<()>;

    /// Ask the manager to re-send the authoritative status of these tasks.
    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> DriverResult<()>;

    /// Stop the driver and abort the framework session.
    async fn stop(&self);
}

/// Outbound calls available to the executor plane.
#[async_trait]
pub trait ExecutorDriver: Send + Sync {
    async fn send_status_update(&self, status: TaskStatus) -> DriverResult<()>;

    async fn stop(&self);
}
