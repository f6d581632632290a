//! Errors raised while setting up or driving a simulation.

use laneguard_core::LaneGuardError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Lane blocker error: {0}")]
    Blocker(#[from] LaneGuardError),

    #[error("Simulation setup failed: {0}")]
    Setup(String),

    #[error("Async runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Assertion failed at t={at:.1}s: {message}")]
    Assertion { at: f64, message: String },
}
