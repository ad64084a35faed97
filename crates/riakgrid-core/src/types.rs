//! Cluster-manager driver types.
//!
//! Offers, task descriptors, and task statuses as exchanged with the
//! two-level cluster manager through its driver. Identifiers are plain
//! strings; the manager assigns offer and worker ids, the framework
//! assigns task ids.

use serde::{Deserialize, Serialize};

use crate::resources::Resource;

pub type OfferId = String;
pub type TaskId = String;
pub type WorkerId = String;
pub type ExecutorId = String;
pub type FrameworkId = String;

/// A time-limited grant of a worker's resources.
///
/// Offers are ephemeral: accepted, declined, or rescinded. They are
/// borrowed for the duration of a `ResourceOffers` event and never
/// retained by the framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub worker_id: WorkerId,
    pub hostname: String,
    pub resources: Vec<Resource>,
}

/// Task lifecycle states as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
}

impl TaskState {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished
                | TaskState::Failed
                | TaskState::Killed
                | TaskState::Lost
                | TaskState::Error
        )
    }
}

/// A status report for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<TaskId>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// How a worker fetches and starts the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    /// Artifact URIs fetched into the sandbox before launch.
    pub uris: Vec<String>,
    /// Shell command that starts the executor.
    pub value: String,
}

/// The executor a task runs under, with its own resource bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    pub command: CommandInfo,
    pub resources: Vec<Resource>,
}

/// A unit of work dispatched against an accepted slice of an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub name: String,
    pub worker_id: WorkerId,
    pub executor: ExecutorInfo,
    pub resources: Vec<Resource>,
    /// Opaque payload delivered to the executor (serialized `TaskData`).
    #[serde(with = "serde_bytes_base64")]
    pub data: Vec<u8>,
}

/// Filters attached to a launch call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Filters {
    /// How long the manager withholds the unmatched remainder of the offer.
    pub refuse_seconds: f64,
}

/// Registration info emitted to the cluster manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub name: String,
    pub role: String,
    pub user: String,
    pub checkpoint: bool,
    pub failover_timeout: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webui_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl FrameworkInfo {
    /// Framework info with the defaults the manager expects: checkpointing
    /// on, a one-day failover timeout, and the guest user unless told
    /// otherwise.
    pub fn new(name: impl Into<String>, role: impl Into<String>, user: Option<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            user: user.unwrap_or_else(|| "guest".to_string()),
            checkpoint: true,
            failover_timeout: 86_400.0,
            id: None,
            webui_url: None,
            principal: None,
        }
    }
}

/// Principal + secret for authenticated registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub principal: String,
    pub secret: Vec<u8>,
}

/// Identity of the manager's current master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterInfo {
    pub id: String,
    pub hostname: String,
    pub port: u16,
}

/// Base64 wire encoding for opaque byte payloads.
mod serde_bytes_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}
