//! The scheduler's record of one database node.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use riakgrid_core::{
    ask_for_cpu, ask_for_disk, ask_for_memory, ask_for_ports, combine_askers, CombinedAsker,
    TaskId, TaskState, TaskStatus, WorkerId,
};

use crate::store::RelaunchPolicy;

/// Resources billed to the executor itself, next to the task's own ask.
pub const EXECUTOR_CPUS: f64 = 0.1;
pub const EXECUTOR_MEM: f64 = 32.0;

/// Per-node resource requirements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeAsk {
    pub cpus: f64,
    pub mem: f64,
    pub disk: f64,
    pub port_count: usize,
}

impl Default for NodeAsk {
    fn default() -> Self {
        Self {
            cpus: 1.0,
            mem: 512.0,
            disk: 1024.0,
            port_count: 4,
        }
    }
}

/// Node lifecycle as the scheduler sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Declared,
    AwaitingOffer,
    Launched,
    Running,
    Failed,
    Finished,
}

/// One database instance owned by a cluster.
///
/// The record round-trips through the coordination service as JSON. The
/// reconciliation bookkeeping is runtime-only and deliberately not
/// serialized: a reloaded node starts unreconciled, which is exactly what
/// a scheduler restart requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiakNode {
    pub uuid: String,
    pub cluster_name: String,
    pub status: NodeStatus,
    /// Task id of the current launch attempt; regenerated on every launch.
    pub current_task_id: Option<TaskId>,
    pub last_state: Option<TaskState>,
    pub worker_id: Option<WorkerId>,
    pub hostname: Option<String>,
    /// Launch attempt counter, part of every task id.
    pub generation: u64,
    pub ask: NodeAsk,

    #[serde(skip)]
    pub reconciled: bool,
    #[serde(skip)]
    pub last_asked_to_reconcile: Option<Instant>,
}

impl RiakNode {
    pub fn new(cluster_name: impl Into<String>, ask: NodeAsk) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            cluster_name: cluster_name.into(),
            status: NodeStatus::Declared,
            current_task_id: None,
            last_state: None,
            worker_id: None,
            hostname: None,
            generation: 0,
            ask,
            reconciled: true,
            last_asked_to_reconcile: None,
        }
    }

    /// Whether the next offer round should try to place this node.
    pub fn needs_to_be_scheduled(&self, policy: RelaunchPolicy) -> bool {
        match self.status {
            NodeStatus::Declared | NodeStatus::AwaitingOffer => true,
            NodeStatus::Failed => policy == RelaunchPolicy::OnFailure,
            NodeStatus::Launched | NodeStatus::Running | NodeStatus::Finished => false,
        }
    }

    /// Bind this node to a placement: generate the task id for this launch
    /// attempt and record where it landed. The node is unreconciled until
    /// the manager reports on the new task id.
    pub fn prepare_for_launch(&mut self, worker_id: &str, hostname: &str) -> TaskId {
        self.generation += 1;
        let task_id = format!(
            "{}-{}-{}",
            self.cluster_name,
            &self.uuid[..8.min(self.uuid.len())],
            self.generation
        );
        self.current_task_id = Some(task_id.clone());
        self.worker_id = Some(worker_id.to_string());
        self.hostname = Some(hostname.to_string());
        self.status = NodeStatus::Launched;
        self.last_state = None;
        self.reconciled = false;
        self.last_asked_to_reconcile = None;
        task_id
    }

    /// Fully-qualified database node name for the current placement.
    pub fn node_name(&self) -> String {
        format!(
            "riak-{}@{}",
            &self.uuid[..8.min(self.uuid.len())],
            self.hostname.as_deref().unwrap_or("localhost")
        )
    }

    /// Fully-qualified explorer sidecar name for the current placement.
    pub fn explorer_node_name(&self) -> String {
        format!(
            "explorer-{}@{}",
            &self.uuid[..8.min(self.uuid.len())],
            self.hostname.as_deref().unwrap_or("localhost")
        )
    }

    /// Last-known status, as sent with explicit reconciliation requests.
    pub fn task_status(&self) -> TaskStatus {
        TaskStatus::new(
            self.current_task_id.clone().unwrap_or_else(|| self.uuid.clone()),
            self.last_state.unwrap_or(TaskState::Lost),
        )
    }

    /// Apply a status update from the cluster manager.
    ///
    /// Staging/starting updates only refresh bookkeeping; terminal failure
    /// states drop the task binding so the node becomes eligible for
    /// rescheduling under the relaunch policy.
    pub fn handle_status_update(&mut self, status: &TaskStatus) {
        self.reconciled = true;
        self.last_state = Some(status.state);

        match status.state {
            TaskState::Staging | TaskState::Starting => {}
            TaskState::Running => {
                info!(uuid = %self.uuid, task_id = %status.task_id, "node running");
                self.status = NodeStatus::Running;
            }
            TaskState::Finished => {
                info!(uuid = %self.uuid, task_id = %status.task_id, "node finished");
                self.status = NodeStatus::Finished;
            }
            TaskState::Failed | TaskState::Killed | TaskState::Lost | TaskState::Error => {
                warn!(
                    uuid = %self.uuid,
                    task_id = %status.task_id,
                    state = ?status.state,
                    "node failed, dropping task binding"
                );
                self.status = NodeStatus::Failed;
                self.current_task_id = None;
            }
        }
    }

    /// The combined asker that carves this node's executor and task
    /// resources from one offer.
    pub fn combined_asker(&self) -> CombinedAsker {
        combine_askers(
            vec![ask_for_cpu(EXECUTOR_CPUS), ask_for_memory(EXECUTOR_MEM)],
            vec![
                ask_for_cpu(self.ask.cpus),
                ask_for_memory(self.ask.mem),
                ask_for_disk(self.ask.disk),
                ask_for_ports(self.ask.port_count),
            ],
        )
    }
}
