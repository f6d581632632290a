//! LaneGuard Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the lane blocker run
//! against **Production** (tokio, real transform tree, fleet transport) or
//! **Simulation** (virtual clock, scripted transforms, recording publisher).
//!
//! # Intercepted I/O
//!
//! - Time (`now()`)
//! - Frame transforms (`lookup()` with a bounded timeout)
//! - Outbound lane/speed-limit requests (`publish_*()`)
//!
//! # Example
//!
//! ```ignore
//! use laneguard_env::TransformLookup;
//!
//! async fn to_map<Tf: TransformLookup>(tf: &Tf, obs: &Observation) -> Option<[f64; 2]> {
//!     let t = tf.lookup("map", &obs.frame, obs.stamp, Duration::from_millis(500)).await.ok()?;
//!     Some(t.apply_point(obs.center))
//! }
//! ```

mod context;
mod error;
mod publisher;
mod tokio_impl;
mod transform;
mod types;

pub use context::LaneGuardContext;
pub use error::EnvError;
pub use publisher::RequestPublisher;
pub use tokio_impl::{ChannelPublisher, TokioContext};
pub use transform::{FrameTransform, TransformLookup};
pub use types::{LaneRequest, Observation, OutboundRequest, SpeedLimitRequest};
