//! Reconciliation server.
//!
//! After a scheduler restart the cluster manager is the source of truth
//! for live task states. This background loop periodically gathers every
//! node that has not yet been confirmed for its current task id and sends
//! the manager an explicit reconciliation request with their last-known
//! statuses. A node leaves the pending set when a status update for its
//! current task id arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use riakgrid_core::SchedulerDriver;

use crate::core::SchedulerCore;

pub struct ReconciliationServer;

impl ReconciliationServer {
    /// Spawn the reconciliation loop.
    ///
    /// The loop only asks while the core's reconcile signal is enabled
    /// (set on registration) and stops when `shutdown` flips.
    pub fn spawn(
        core: Arc<SchedulerCore>,
        driver: Arc<dyn SchedulerDriver>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let enabled = core.reconcile_signal();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "reconciliation server started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if !*enabled.borrow() {
                            continue;
                        }
                        let statuses = core.tasks_to_reconcile().await;
                        if statuses.is_empty() {
                            continue;
                        }
                        debug!(count = statuses.len(), "requesting explicit reconciliation");
                        if let Err(e) = driver.reconcile_tasks(statuses).await {
                            error!(error = %e, "reconciliation request failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("reconciliation server stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
