//! Production implementations backed by Tokio.

use crate::error::EnvError;
use crate::publisher::RequestPublisher;
use crate::types::{LaneRequest, OutboundRequest, SpeedLimitRequest};
use crate::LaneGuardContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Production context backed by Tokio and the system clock.
///
/// `now()` follows the Tokio clock, so it honours `tokio::time::pause()`.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneGuardContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

/// Publisher that forwards every request into an mpsc channel.
///
/// The receiving half is owned by whatever bridges requests onto the fleet
/// transport.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<OutboundRequest>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiver that drains it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    async fn forward(&self, request: OutboundRequest) -> Result<(), EnvError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EnvError::publish("Request channel closed"))
    }
}

#[async_trait]
impl RequestPublisher for ChannelPublisher {
    async fn publish_lane_request(&self, request: LaneRequest) -> Result<(), EnvError> {
        self.forward(OutboundRequest::Lane(request)).await
    }

    async fn publish_speed_limit(&self, request: SpeedLimitRequest) -> Result<(), EnvError> {
        self.forward(OutboundRequest::SpeedLimit(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[test]
    fn test_tokio_context_seed() {
        let ctx = TokioContext::new();
        assert_eq!(ctx.seed(), 0);
    }

    #[tokio::test]
    async fn test_channel_publisher_forwards_in_order() {
        let (publisher, mut rx) = ChannelPublisher::channel(8);
        publisher
            .publish_lane_request(LaneRequest::close("tinyRobot", 3))
            .await
            .unwrap();
        publisher
            .publish_speed_limit(SpeedLimitRequest {
                fleet_name: "tinyRobot".to_string(),
                lane_index: 3,
                limit: Some(0.5),
            })
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(OutboundRequest::Lane(LaneRequest::close("tinyRobot", 3)))
        );
        assert!(matches!(
            rx.recv().await,
            Some(OutboundRequest::SpeedLimit(r)) if r.limit == Some(0.5)
        ));
    }

    #[tokio::test]
    async fn test_channel_publisher_reports_closed_channel() {
        let (publisher, rx) = ChannelPublisher::channel(1);
        drop(rx);
        let result = publisher
            .publish_lane_request(LaneRequest::open("tinyRobot", 0))
            .await;
        assert!(matches!(result, Err(EnvError::PublishError(_))));
    }
}
