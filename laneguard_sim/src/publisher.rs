//! Publisher that records every request with its virtual timestamp.

use async_trait::async_trait;
use laneguard_env::{
    EnvError, LaneGuardContext, LaneRequest, OutboundRequest, RequestPublisher, SpeedLimitRequest,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::context::SimContext;

/// A request as it left the lane blocker.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub at: Duration,
    pub request: OutboundRequest,
}

pub struct RecordingPublisher {
    context: SimContext,
    requests: Mutex<Vec<RecordedRequest>>,

    /// When set, every publish fails with `PublishError`
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new(context: SimContext) -> Self {
        Self {
            context,
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    fn requests(&self) -> MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every request recorded so far, oldest first.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests().clone()
    }

    /// Lane requests only, oldest first.
    pub fn lane_requests(&self) -> Vec<LaneRequest> {
        self.requests()
            .iter()
            .filter_map(|r| match &r.request {
                OutboundRequest::Lane(request) => Some(request.clone()),
                OutboundRequest::SpeedLimit(_) => None,
            })
            .collect()
    }

    /// Speed-limit requests only, oldest first.
    pub fn speed_limit_requests(&self) -> Vec<SpeedLimitRequest> {
        self.requests()
            .iter()
            .filter_map(|r| match &r.request {
                OutboundRequest::SpeedLimit(request) => Some(request.clone()),
                OutboundRequest::Lane(_) => None,
            })
            .collect()
    }

    fn record(&self, request: OutboundRequest) -> Result<(), EnvError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnvError::publish("simulated transport failure"));
        }
        let at = self.context.now();
        self.requests().push(RecordedRequest { at, request });
        Ok(())
    }
}

#[async_trait]
impl RequestPublisher for RecordingPublisher {
    async fn publish_lane_request(&self, request: LaneRequest) -> Result<(), EnvError> {
        self.record(OutboundRequest::Lane(request))
    }

    async fn publish_speed_limit(&self, request: SpeedLimitRequest) -> Result<(), EnvError> {
        self.record(OutboundRequest::SpeedLimit(request))
    }
}
