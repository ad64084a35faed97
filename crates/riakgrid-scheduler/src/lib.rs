//! riakgrid-scheduler — the framework's control plane.
//!
//! The scheduler subscribes to the cluster manager through a driver,
//! accepts resource offers, carves per-node allotments with the placement
//! engine, and drives launched nodes through their lifecycle. Every driver
//! callback arrives as a `SchedulerEvent` on one channel and is handled
//! sequentially under a single scheduler-wide mutex, so callback ordering
//! equals effect ordering. State mutations persist to the coordination
//! service before the next event is taken.
//!
//! ```text
//! SchedulerCore
//!   ├── SchedulerState (mirrored from the coordination service)
//!   ├── placement engine (riakgrid-placement)
//!   ├── ReconciliationServer (periodic explicit reconciliation)
//!   └── artifact + admin HTTP server (axum)
//! ```

pub mod artifact;
pub mod core;
pub mod error;
pub mod reconciler;

pub use crate::core::{SchedulerConfig, SchedulerCore, OFFER_REFUSE_SECONDS};
pub use error::{SchedulerError, SchedulerResult};
pub use reconciler::ReconciliationServer;
