//! LaneGuard Deterministic Simulation Harness
//!
//! Runs the real [`laneguard_core::LaneBlockerRuntime`] against simulated
//! environment seams so whole scenarios replay identically from a seed:
//! - **Time**: a virtual clock advanced step by step
//! - **Transforms**: a frame table with injectable missing frames and latency
//! - **Requests**: a publisher that records everything with its timestamp
//! - **Obstacles**: a seeded oracle producing noisy sensor-frame observations
//!
//! # Usage
//!
//! ```ignore
//! use laneguard_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::CorridorBlockage);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod oracle;
mod publisher;
mod runner;
pub mod scenarios;
mod transforms;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use oracle::{GroundTruthObstacle, Oracle, SensorMount};
pub use publisher::{RecordedRequest, RecordingPublisher};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use transforms::SimTransforms;
pub use world::{SimConfig, SimRuntime, SimWorld, WorldMetrics, FLEET};
