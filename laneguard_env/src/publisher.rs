//! Outbound request transport abstraction.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{LaneRequest, SpeedLimitRequest};

/// Abstraction over the channel that carries lane-state decisions to fleets.
///
/// # Implementations
///
/// - **Production**: `ChannelPublisher` - forwards into a tokio mpsc channel
///   drained by the transport bridge
/// - **Simulation**: `RecordingPublisher` - keeps every request for assertions
///
/// # Delivery
///
/// `Ok(())` means the request was handed to the transport, not that a fleet
/// acted on it.
#[async_trait]
pub trait RequestPublisher: Send + Sync + 'static {
    /// Publishes a lane closure or reopen request.
    async fn publish_lane_request(&self, request: LaneRequest) -> Result<(), EnvError>;

    /// Publishes a speed-limit request (`limit: None` lifts the restriction).
    async fn publish_speed_limit(&self, request: SpeedLimitRequest) -> Result<(), EnvError>;
}
