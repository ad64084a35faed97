//! riakgrid-state — durable scheduler state and its storage layer.
//!
//! The durable copy of everything the scheduler knows lives in a
//! hierarchical coordination service (ZooKeeper family): named nodes with
//! byte payloads, ephemeral children, and advisory locks. This crate holds
//! the `CoordinationStore` abstraction over those primitives, an in-memory
//! backend for tests and standalone mode, the persisted domain records
//! (`RiakNode`, `RiakCluster`, `SchedulerState`), and the storage glue
//! that round-trips them through the service.

pub mod coordination;
pub mod error;
pub mod memory;
pub mod node;
pub mod store;

pub use coordination::{paths, CoordinationLock, CoordinationStore};
pub use error::{StateError, StateResult};
pub use memory::MemoryCoordination;
pub use node::{NodeAsk, NodeStatus, RiakNode, EXECUTOR_CPUS, EXECUTOR_MEM};
pub use store::{RelaunchPolicy, RiakCluster, SchedulerState, StateStorage};
