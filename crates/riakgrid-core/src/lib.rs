//! riakgrid-core — shared types for the riakgrid framework.
//!
//! This crate holds everything both planes (scheduler and executor) need
//! to agree on:
//!
//! - The resource model (`Resource`, scalar and port-range shapes) and the
//!   carving algebra (`ResourceAsker` / `CombinedAsker`) used by placement
//! - The cluster-manager driver surface: offer/task/status types, the
//!   `SchedulerEvent` / `ExecutorEvent` sum types, and the driver traits
//! - The payloads shipped between the planes (`TaskData`, `CoordinatedData`)

pub mod asker;
pub mod data;
pub mod driver;
pub mod resources;
pub mod types;

pub use asker::{
    apply_askers, ask_for_cpu, ask_for_disk, ask_for_memory, ask_for_ports, ask_for_scalar,
    combine_askers, CarvedAsk, CombinedAsk, CombinedAsker, ResourceAsker,
};
pub use data::{CoordinatedData, TaskData};
pub use driver::{
    DriverError, DriverResult, ExecutorDriver, ExecutorEvent, SchedulerDriver, SchedulerEvent,
};
pub use resources::{array_to_ranges, ranges_to_array, scalar_sum, Resource, ResourceValue, ValueRange};
pub use types::{
    CommandInfo, Credential, ExecutorInfo, Filters, FrameworkInfo, MasterInfo, Offer, OfferId,
    TaskId, TaskInfo, TaskState, TaskStatus, WorkerId,
};
