//! Persisted scheduler state.
//!
//! `SchedulerState` is the root the scheduler mutates in memory; the
//! coordination service holds the durable copy, written back after every
//! mutation that affects placement or lifecycle. Clusters own their nodes;
//! a node refers back to its cluster only by name, which keeps the
//! serialized form acyclic.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::coordination::{paths, CoordinationStore};
use crate::error::StateResult;
use crate::node::RiakNode;

/// What to do with a node whose task reached a terminal failure state.
///
/// Owned by scheduler state rather than hard-coded; the default is
/// single-launch with external re-declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaunchPolicy {
    #[default]
    Never,
    OnFailure,
}

/// A named grouping of nodes sharing one logical database cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiakCluster {
    pub name: String,
    pub nodes: HashMap<String, RiakNode>,
}

impl RiakCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: RiakNode) -> &RiakNode {
        let uuid = node.uuid.clone();
        self.nodes.insert(uuid.clone(), node);
        &self.nodes[&uuid]
    }
}

/// The persisted root: framework identity plus every cluster.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub framework_id: Option<String>,
    pub relaunch_policy: RelaunchPolicy,
    pub clusters: HashMap<String, RiakCluster>,
}

impl SchedulerState {
    /// Look up a node by uuid across clusters.
    pub fn node_mut(&mut self, cluster: &str, uuid: &str) -> Option<&mut RiakNode> {
        self.clusters.get_mut(cluster)?.nodes.get_mut(uuid)
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &RiakNode> {
        self.clusters.values().flat_map(|c| c.nodes.values())
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut RiakNode> {
        self.clusters.values_mut().flat_map(|c| c.nodes.values_mut())
    }
}

/// Round-trips `SchedulerState` through the coordination service.
#[derive(Clone)]
pub struct StateStorage {
    store: Arc<dyn CoordinationStore>,
    framework: String,
}

impl StateStorage {
    pub fn new(store: Arc<dyn CoordinationStore>, framework: impl Into<String>) -> Self {
        Self {
            store,
            framework: framework.into(),
        }
    }

    pub fn framework_name(&self) -> &str {
        &self.framework
    }

    pub fn coordination(&self) -> Arc<dyn CoordinationStore> {
        Arc::clone(&self.store)
    }

    /// Write the full state back.
    ///
    /// Node records are one JSON payload each under their cluster's
    /// `nodes/` path, so a crash between mutation and persist loses only
    /// in-flight launches.
    pub async fn persist(&self, state: &SchedulerState) -> StateResult<()> {
        let fw = &self.framework;

        if let Some(id) = &state.framework_id {
            let path = paths::framework_id(fw);
            self.store.create_persistent(&path, id.as_bytes()).await?;
            self.store.set_data(&path, id.as_bytes()).await?;
        }

        let policy_path = paths::relaunch_policy(fw);
        let policy = serde_json::to_vec(&state.relaunch_policy)?;
        self.store.create_persistent(&policy_path, &policy).await?;
        self.store.set_data(&policy_path, &policy).await?;

        for cluster in state.clusters.values() {
            self.store
                .create_persistent(&paths::cluster_nodes(fw, &cluster.name), &[])
                .await?;
            for node in cluster.nodes.values() {
                let path = paths::node(fw, &cluster.name, &node.uuid);
                let bytes = serde_json::to_vec(node)?;
                self.store.create_persistent(&path, &bytes).await?;
                self.store.set_data(&path, &bytes).await?;
            }
        }

        debug!(framework = %fw, clusters = state.clusters.len(), "scheduler state persisted");
        Ok(())
    }

    /// Rebuild the state from the coordination service.
    pub async fn load(&self) -> StateResult<SchedulerState> {
        let fw = &self.framework;
        let mut state = SchedulerState::default();

        state.framework_id = self
            .store
            .get_data(&paths::framework_id(fw))
            .await?
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .filter(|s| !s.is_empty());

        if let Some(bytes) = self.store.get_data(&paths::relaunch_policy(fw)).await? {
            state.relaunch_policy = serde_json::from_slice(&bytes)?;
        }

        for cluster_name in self.store.get_children(&paths::clusters(fw)).await? {
            let mut cluster = RiakCluster::new(&cluster_name);
            let nodes_path = paths::cluster_nodes(fw, &cluster_name);
            for uuid in self.store.get_children(&nodes_path).await? {
                let node_path = paths::node(fw, &cluster_name, &uuid);
                let Some(bytes) = self.store.get_data(&node_path).await? else {
                    continue;
                };
                let node: RiakNode = serde_json::from_slice(&bytes)?;
                cluster.nodes.insert(uuid, node);
            }
            state.clusters.insert(cluster_name.clone(), cluster);
        }

        info!(
            framework = %fw,
            clusters = state.clusters.len(),
            nodes = state.nodes().count(),
            "scheduler state loaded"
        );
        Ok(state)
    }

    /// Remove a node record that no longer exists in memory.
    pub async fn delete_node(&self, cluster: &str, uuid: &str) -> StateResult<bool> {
        self.store
            .delete(&paths::node(&self.framework, cluster, uuid))
            .await
    }
}
