//! Common wire types for the LaneGuard environment abstraction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single obstacle detection as delivered by a perception source.
///
/// The box is expressed in `frame` and must be transformed into the common
/// reference frame before it can be compared against lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the detecting source (sensor, perception node)
    pub source: String,

    /// Source-local obstacle id
    pub id: u64,

    /// Frame the box is expressed in
    pub frame: String,

    /// Box center [x, y] in `frame`
    pub center: [f64; 2],

    /// Box heading in radians in `frame`
    pub heading: f64,

    /// Full box size [size_x, size_y] in meters
    pub size: [f64; 2],

    /// Detection time on the context clock
    pub stamp: Duration,
}

/// Request to close or reopen one lane of a fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneRequest {
    pub fleet_name: String,
    pub lane_index: usize,
    pub closed: bool,
}

impl LaneRequest {
    pub fn close(fleet_name: impl Into<String>, lane_index: usize) -> Self {
        Self {
            fleet_name: fleet_name.into(),
            lane_index,
            closed: true,
        }
    }

    pub fn open(fleet_name: impl Into<String>, lane_index: usize) -> Self {
        Self {
            fleet_name: fleet_name.into(),
            lane_index,
            closed: false,
        }
    }
}

/// Request to impose (`Some`) or lift (`None`) a speed limit on one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimitRequest {
    pub fleet_name: String,
    pub lane_index: usize,
    pub limit: Option<f64>,
}

/// Any request leaving the lane blocker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundRequest {
    Lane(LaneRequest),
    SpeedLimit(SpeedLimitRequest),
}
