//! ExecutorCore — driver callbacks on the worker side.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use riakgrid_core::{ExecutorDriver, ExecutorEvent, TaskId};
use riakgrid_state::CoordinationStore;

use crate::node::{FinishHandle, NodeSettings, RiakNode};

/// Owns the executor-side event loop. One executor hosts one node; a
/// second launch on the same executor is rejected.
pub struct ExecutorCore {
    driver: Arc<dyn ExecutorDriver>,
    coordination: Arc<dyn CoordinationStore>,
    settings: NodeSettings,
    active: Option<(TaskId, FinishHandle)>,
}

impl ExecutorCore {
    pub fn new(
        driver: Arc<dyn ExecutorDriver>,
        coordination: Arc<dyn CoordinationStore>,
        settings: NodeSettings,
    ) -> Self {
        Self {
            driver,
            coordination,
            settings,
            active: None,
        }
    }

    /// Drain driver events until shutdown or channel close.
    pub async fn run(mut self, mut events: mpsc::Receiver<ExecutorEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ExecutorEvent::LaunchTask(task) => {
                    if let Some((task_id, _)) = &self.active {
                        error!(running = %task_id, refused = %task.task_id, "executor already hosts a node");
                        continue;
                    }
                    let task_id = task.task_id.clone();
                    match RiakNode::new(
                        task,
                        Arc::clone(&self.driver),
                        Arc::clone(&self.coordination),
                        self.settings.clone(),
                    ) {
                        Ok((node, finish)) => {
                            info!(%task_id, "launching node");
                            self.active = Some((task_id, finish));
                            tokio::spawn(node.run());
                        }
                        Err(e) => {
                            error!(%task_id, error = %e, "task payload rejected");
                        }
                    }
                }
                ExecutorEvent::KillTask(task_id) => match &self.active {
                    Some((active_id, finish)) if *active_id == task_id => {
                        info!(%task_id, "kill requested");
                        finish.finish().await;
                    }
                    _ => warn!(%task_id, "kill for a task this executor does not host"),
                },
                ExecutorEvent::Shutdown => {
                    info!("shutdown requested");
                    if let Some((_, finish)) = self.active.take() {
                        finish.finish().await;
                    }
                    break;
                }
            }
        }
    }
}
