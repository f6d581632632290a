//! Core environment context trait for LaneGuard runtimes.

use std::time::Duration;

/// The clock and identity of the environment the lane blocker runs in.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
///
/// # Determinism
///
/// Obstacle expiry and culling are computed on `now()`, so in simulation
/// every cull decision is reproducible from the scenario script alone.
pub trait LaneGuardContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Observation stamps and expiry times are expressed on this clock.
    fn now(&self) -> Duration;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
