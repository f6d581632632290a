//! Errors raised by the lane blocker core.

use crate::keys::LaneKey;

/// Errors that can occur while tracking obstacles and deciding lane states.
///
/// Invariant violations (`MalformedKey`, `UnknownLane`, `IndexInconsistent`,
/// `StatePoisoned`) are fatal: the runtime stops rather than keep acting on a
/// corrupted index. Everything else rejects a single input.
#[derive(Debug, thiserror::Error)]
pub enum LaneGuardError {
    #[error("Malformed key: {0:?}")]
    MalformedKey(String),

    #[error("Lane not tracked: {0}")]
    UnknownLane(LaneKey),

    #[error("Vicinity index inconsistent: {0}")]
    IndexInconsistent(String),

    #[error("Invalid navigation graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lane blocker state poisoned by an earlier panic")]
    StatePoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LaneGuardError {
    /// True for errors that mean the shared state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LaneGuardError::MalformedKey(_)
                | LaneGuardError::UnknownLane(_)
                | LaneGuardError::IndexInconsistent(_)
                | LaneGuardError::StatePoisoned
        )
    }
}
