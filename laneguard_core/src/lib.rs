//! LaneGuard Core - Obstacle-Driven Lane Closure
//!
//! Keeps fleet navigation lanes clear of persistent obstacles:
//! 1. **Geometry**: oriented-box contact test with a separation distance
//! 2. **Association**: a two-way obstacle/lane vicinity index kept in sync
//! 3. **Decisions**: close a lane at N nearby obstacles, reopen it at zero
//! 4. **Culling**: obstacles that stop being observed expire after a TTL
//!
//! [`runtime::LaneBlockerRuntime`] ties these to the environment seams of
//! `laneguard_env` (clock, transform lookup, request publisher).

pub mod association;
pub mod blocker;
pub mod config;
pub mod culling;
pub mod error;
pub mod geometry;
pub mod keys;
pub mod lanes;
pub mod obstacles;
pub mod requests;
pub mod runtime;
pub mod vicinity;


// Re-export key types for convenience
pub use blocker::{BlockerSnapshot, LaneBlocker};
pub use config::{LaneBlockerConfig, MitigationPolicy};
pub use error::LaneGuardError;
pub use geometry::{intersects, Contact, OrientedBox};
pub use keys::{LaneKey, ObstacleKey};
pub use lanes::{GraphEdge, GraphLane, LaneIndex, NavGraph, Waypoint};
pub use obstacles::{ObstacleRecord, ObstacleStore};
pub use requests::{ExternalLaneStates, LaneTransition, RequestPlanner};
pub use runtime::{
    GraphUpdate, IngestOutcome, LaneBlockerRuntime, LaneStatesUpdate, PassOutcome, RuntimeInputs,
};
pub use vicinity::VicinityIndex;
