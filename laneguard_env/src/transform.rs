//! Frame transform lookup abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EnvError;

/// A planar rigid transform: rotate by `yaw`, then translate by `(x, y)`.
///
/// Maps coordinates expressed in a source frame into the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl FrameTransform {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    /// The transform that leaves every point unchanged.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Maps a point from the source frame into the target frame.
    pub fn apply_point(&self, point: [f64; 2]) -> [f64; 2] {
        let (sin, cos) = self.yaw.sin_cos();
        [
            self.x + cos * point[0] - sin * point[1],
            self.y + sin * point[0] + cos * point[1],
        ]
    }

    /// Maps a heading from the source frame into the target frame.
    pub fn apply_heading(&self, heading: f64) -> f64 {
        heading + self.yaw
    }

    /// The transform mapping target-frame coordinates back into the source frame.
    pub fn inverse(&self) -> FrameTransform {
        let (sin, cos) = self.yaw.sin_cos();
        FrameTransform::new(
            -(cos * self.x + sin * self.y),
            sin * self.x - cos * self.y,
            -self.yaw,
        )
    }
}

/// Looks up the transform between two coordinate frames.
///
/// # Contract
///
/// Implementations must give up after `timeout` and return
/// `EnvError::TransformTimeout`. Callers drop the observation that needed
/// the transform; there is no retry.
#[async_trait]
pub trait TransformLookup: Send + Sync + 'static {
    /// Returns the transform mapping `source_frame` coordinates into
    /// `target_frame` coordinates, valid at `at` (context clock).
    async fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        at: Duration,
        timeout: Duration,
    ) -> Result<FrameTransform, EnvError>;
}
