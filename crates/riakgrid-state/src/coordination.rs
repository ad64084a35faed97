//! Coordination-service abstraction.
//!
//! The framework needs six primitives from the coordination service plus a
//! fair distributed lock. Production deployments back this trait with a
//! ZooKeeper-family client; tests and standalone mode use the in-memory
//! backend in [`crate::memory`].
//!
//! Path layout under the framework root:
//!
//! ```text
//! /<framework-name>/
//!     framework-id
//!     clusters/
//!         <cluster-name>/
//!             nodes/<uuid>                        persisted node record
//!             coordinator/                        lock path
//!                 coordinatedNodes/<task-id>      ephemeral advertisement
//! ```

use std::any::Any;

use async_trait::async_trait;

use crate::error::StateResult;

/// A held distributed lock. Dropping the guard releases the lock, which is
/// also what session loss does for the real service.
pub struct CoordinationLock {
    _held: Box<dyn Any + Send>,
}

impl CoordinationLock {
    pub fn new(held: impl Any + Send) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

/// The primitive operations the framework requires.
///
/// Intermediate path components are created on demand by the write
/// operations. `get_children` returns child names, not full paths.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a persistent node. Idempotent: an existing node is left as
    /// it is, data included.
    async fn create_persistent(&self, path: &str, data: &[u8]) -> StateResult<()>;

    /// Create a node bound to this handle's session; it disappears when
    /// the session does. Fails if the node already exists.
    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> StateResult<()>;

    /// Overwrite a node's payload. Fails if the node does not exist.
    async fn set_data(&self, path: &str, data: &[u8]) -> StateResult<()>;

    async fn get_data(&self, path: &str) -> StateResult<Option<Vec<u8>>>;

    /// Names of the direct children of `path`, sorted.
    async fn get_children(&self, path: &str) -> StateResult<Vec<String>>;

    /// Delete a node. Returns whether it existed.
    async fn delete(&self, path: &str) -> StateResult<bool>;

    /// Acquire the fair lock keyed on `path`, waiting in arrival order.
    async fn lock(&self, path: &str) -> StateResult<CoordinationLock>;
}

/// Coordination-path construction for the framework layout.
pub mod paths {
    pub fn framework_root(framework: &str) -> String {
        format!("/{framework}")
    }

    pub fn framework_id(framework: &str) -> String {
        format!("/{framework}/framework-id")
    }

    pub fn relaunch_policy(framework: &str) -> String {
        format!("/{framework}/relaunch-policy")
    }

    pub fn clusters(framework: &str) -> String {
        format!("/{framework}/clusters")
    }

    pub fn cluster(framework: &str, cluster: &str) -> String {
        format!("/{framework}/clusters/{cluster}")
    }

    pub fn cluster_nodes(framework: &str, cluster: &str) -> String {
        format!("/{framework}/clusters/{cluster}/nodes")
    }

    pub fn node(framework: &str, cluster: &str, uuid: &str) -> String {
        format!("/{framework}/clusters/{cluster}/nodes/{uuid}")
    }

    pub fn coordinator(framework: &str, cluster: &str) -> String {
        format!("/{framework}/clusters/{cluster}/coordinator")
    }

    pub fn coordinated_nodes(framework: &str, cluster: &str) -> String {
        format!("/{framework}/clusters/{cluster}/coordinator/coordinatedNodes")
    }

    pub fn coordinated_node(framework: &str, cluster: &str, task_id: &str) -> String {
        format!("/{framework}/clusters/{cluster}/coordinator/coordinatedNodes/{task_id}")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn layout_matches_the_hierarchy() {
            assert_eq!(framework_id("rg"), "/rg/framework-id");
            assert_eq!(node("rg", "c1", "u1"), "/rg/clusters/c1/nodes/u1");
            assert_eq!(
                coordinated_node("rg", "c1", "t1"),
                "/rg/clusters/c1/coordinator/coordinatedNodes/t1"
            );
            assert!(coordinated_nodes("rg", "c1").starts_with(&coordinator("rg", "c1")));
        }
    }
}
