//! Scripted transform tree for simulation.
//!
//! Every frame is stored as its transform into the target frame. Scenarios
//! inject faults by removing a frame (lookup fails immediately) or by giving
//! it a lookup latency; a latency above the caller's timeout fails with
//! `TransformTimeout` without anyone actually waiting.

use async_trait::async_trait;
use laneguard_env::{EnvError, FrameTransform, TransformLookup};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Default)]
struct FrameTable {
    frames: HashMap<String, FrameTransform>,
    latency: HashMap<String, Duration>,
}

/// Transform lookup over a static, fault-injectable frame table.
#[derive(Debug)]
pub struct SimTransforms {
    target_frame: String,
    table: RwLock<FrameTable>,
}

impl SimTransforms {
    pub fn new(target_frame: impl Into<String>) -> Self {
        Self {
            target_frame: target_frame.into(),
            table: RwLock::new(FrameTable::default()),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FrameTable> {
        self.table.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or move) `frame`, expressed as its transform into the target frame.
    pub fn set_frame(&self, frame: impl Into<String>, transform: FrameTransform) {
        self.write().frames.insert(frame.into(), transform);
    }

    /// Forget `frame`; lookups fail with `FrameNotFound` until it is set again.
    pub fn remove_frame(&self, frame: &str) -> Option<FrameTransform> {
        self.write().frames.remove(frame)
    }

    /// Make lookups of `frame` take `latency`. `Duration::ZERO` clears it.
    pub fn set_latency(&self, frame: impl Into<String>, latency: Duration) {
        let frame = frame.into();
        let mut table = self.write();
        if latency.is_zero() {
            table.latency.remove(&frame);
        } else {
            table.latency.insert(frame, latency);
        }
    }
}

#[async_trait]
impl TransformLookup for SimTransforms {
    async fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        _at: Duration,
        timeout: Duration,
    ) -> Result<FrameTransform, EnvError> {
        if target_frame != self.target_frame {
            return Err(EnvError::frame_not_found(target_frame));
        }
        if source_frame == target_frame {
            return Ok(FrameTransform::identity());
        }

        let table = self
            .table
            .read()
            .map_err(|_| EnvError::ContextError("frame table poisoned".to_string()))?;
        if table.latency.get(source_frame).is_some_and(|l| *l > timeout) {
            return Err(EnvError::TransformTimeout(timeout.as_millis() as u64));
        }
        table
            .frames
            .get(source_frame)
            .copied()
            .ok_or_else(|| EnvError::frame_not_found(source_frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_lookup_known_and_unknown_frames() {
        let tf = SimTransforms::new("map");
        tf.set_frame("lidar_link", FrameTransform::new(1.0, 2.0, 0.5));

        let found = tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.unwrap();
        assert_eq!(found, FrameTransform::new(1.0, 2.0, 0.5));
        assert_eq!(
            tf.lookup("map", "map", Duration::ZERO, TIMEOUT).await.unwrap(),
            FrameTransform::identity()
        );
        assert!(matches!(
            tf.lookup("map", "camera_link", Duration::ZERO, TIMEOUT).await,
            Err(EnvError::FrameNotFound(_))
        ));
        assert!(tf.lookup("odom", "lidar_link", Duration::ZERO, TIMEOUT).await.is_err());
    }

    #[tokio::test]
    async fn test_latency_above_timeout_fails() {
        let tf = SimTransforms::new("map");
        tf.set_frame("lidar_link", FrameTransform::identity());

        tf.set_latency("lidar_link", Duration::from_millis(200));
        assert!(tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.is_ok());

        tf.set_latency("lidar_link", Duration::from_secs(2));
        let err = tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.unwrap_err();
        assert!(err.is_timeout());

        tf.set_latency("lidar_link", Duration::ZERO);
        assert!(tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_removed_frame_fails_until_restored() {
        let tf = SimTransforms::new("map");
        tf.set_frame("lidar_link", FrameTransform::identity());
        let saved = tf.remove_frame("lidar_link").unwrap();
        assert!(tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.is_err());
        tf.set_frame("lidar_link", saved);
        assert!(tf.lookup("map", "lidar_link", Duration::ZERO, TIMEOUT).await.is_ok());
    }
}
