//! riakgrid-placement — matches nodes awaiting placement to offers.
//!
//! The engine is a round-robin bin-packer over the current offer set and
//! the nodes that need scheduling. It deliberately has no packing
//! heuristic: determinism under small offer sets and clear failure
//! semantics beat placement quality here.

pub mod placer;

pub use placer::{spread_across_offers, Assignment, NodeRequest, PlacementError};
