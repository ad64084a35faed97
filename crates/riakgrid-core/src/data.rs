//! Payloads shipped between the planes.
//!
//! `TaskData` rides inside the task descriptor from scheduler to executor
//! and is immutable once dispatched. `CoordinatedData` is what an executor
//! publishes under its cluster's coordination path so later-arriving peers
//! can discover join targets. Both are self-describing JSON so a reader
//! needs no schema negotiation.

use serde::{Deserialize, Serialize};

/// Per-task configuration delivered to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskData {
    /// Fully-qualified database node name, e.g. `riak-abc123@host-7`.
    pub node_name: String,
    /// Fully-qualified explorer sidecar node name.
    pub explorer_node_name: String,
    /// The logical database cluster this node belongs to.
    pub cluster_name: String,
    /// Framework name, the root of all coordination paths.
    pub framework_name: String,
    /// Coordination-service endpoints the executor talks to.
    pub coordination_endpoints: Vec<String>,
}

impl TaskData {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A node's advertisement to its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatedData {
    pub node_name: String,
}

impl CoordinatedData {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_data_round_trips() {
        let data = TaskData {
            node_name: "riak-a1@worker-3".to_string(),
            explorer_node_name: "explorer-a1@worker-3".to_string(),
            cluster_name: "golden".to_string(),
            framework_name: "riakgrid".to_string(),
            coordination_endpoints: vec!["zk-1:2181".to_string(), "zk-2:2181".to_string()],
        };
        let bytes = data.to_bytes().unwrap();
        assert_eq!(TaskData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn coordinated_data_round_trips() {
        let data = CoordinatedData {
            node_name: "riak-a1@worker-3".to_string(),
        };
        let bytes = data.to_bytes().unwrap();
        assert_eq!(CoordinatedData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn task_data_is_self_describing() {
        let data = TaskData {
            node_name: "riak-a1@worker-3".to_string(),
            explorer_node_name: "explorer-a1@worker-3".to_string(),
            cluster_name: "golden".to_string(),
            framework_name: "riakgrid".to_string(),
            coordination_endpoints: vec![],
        };
        let text = String::from_utf8(data.to_bytes().unwrap()).unwrap();
        assert!(text.contains("\"cluster_name\""));
        assert!(text.contains("\"node_name\""));
    }
}
