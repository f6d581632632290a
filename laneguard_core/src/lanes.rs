//! Lane Index - navigation graph lanes as oriented corridors.
//!
//! Each fleet's graph arrives wholesale. Every directed lane becomes a box
//! centered on its segment midpoint, aligned with the segment, as long as the
//! segment and as wide as the configured lane width. A new graph replaces the
//! fleet's lanes; lane identity is `(fleet, lane index)`, so lanes whose index
//! still exists keep their identity across refreshes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::LaneGuardError;
use crate::geometry::OrientedBox;
use crate::keys::LaneKey;

// ============================================================================
// NAVIGATION GRAPH (Input)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub name: String,
}

impl Waypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            name: String::new(),
        }
    }
}

/// A directed lane between two waypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLane {
    /// Index of the entry waypoint
    pub entry: usize,

    /// Index of the exit waypoint
    pub exit: usize,

    /// Nominal speed limit (m/s), if the graph sets one
    #[serde(default)]
    pub speed_limit: Option<f64>,
}

impl GraphLane {
    pub fn new(entry: usize, exit: usize) -> Self {
        Self {
            entry,
            exit,
            speed_limit: None,
        }
    }
}

/// An edge as authored in a building map; may be bidirectional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub v1: usize,
    pub v2: usize,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub speed_limit: Option<f64>,
}

impl GraphEdge {
    pub fn one_way(v1: usize, v2: usize) -> Self {
        Self {
            v1,
            v2,
            bidirectional: false,
            speed_limit: None,
        }
    }

    pub fn two_way(v1: usize, v2: usize) -> Self {
        Self {
            bidirectional: true,
            ..Self::one_way(v1, v2)
        }
    }

    pub fn with_speed_limit(mut self, limit: f64) -> Self {
        self.speed_limit = Some(limit);
        self
    }
}

/// A fleet's navigation graph. The lane index is the position in `lanes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavGraph {
    pub waypoints: Vec<Waypoint>,
    pub lanes: Vec<GraphLane>,
}

impl NavGraph {
    pub fn new(waypoints: Vec<Waypoint>, lanes: Vec<GraphLane>) -> Self {
        Self { waypoints, lanes }
    }

    /// Expand authored edges into directed lanes.
    ///
    /// A bidirectional edge yields the `v1 → v2` lane immediately followed by
    /// the `v2 → v1` lane.
    pub fn from_edges(waypoints: Vec<Waypoint>, edges: &[GraphEdge]) -> Self {
        let mut lanes = Vec::with_capacity(edges.len() * 2);
        for edge in edges {
            lanes.push(GraphLane {
                entry: edge.v1,
                exit: edge.v2,
                speed_limit: edge.speed_limit,
            });
            if edge.bidirectional {
                lanes.push(GraphLane {
                    entry: edge.v2,
                    exit: edge.v1,
                    speed_limit: edge.speed_limit,
                });
            }
        }
        Self { waypoints, lanes }
    }

    /// Parse and validate a JSON graph.
    pub fn from_json_str(json: &str) -> Result<Self, LaneGuardError> {
        let graph: Self = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LaneGuardError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Check that every lane references existing waypoints.
    pub fn validate(&self) -> Result<(), LaneGuardError> {
        let n = self.waypoints.len();
        for (index, lane) in self.lanes.iter().enumerate() {
            if lane.entry >= n || lane.exit >= n {
                return Err(LaneGuardError::InvalidGraph(format!(
                    "lane {} references waypoint {} but graph has {} waypoints",
                    index,
                    lane.entry.max(lane.exit),
                    n
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// LANE INDEX
// ============================================================================

/// A lane corridor ready for vicinity checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub key: LaneKey,
    pub footprint: OrientedBox,
    pub speed_limit: Option<f64>,
}

/// Outcome of replacing a fleet's lanes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneRebuild {
    /// Lanes now indexed for the fleet
    pub indexed: usize,

    /// Lanes skipped because their segment has zero length
    pub skipped: usize,

    /// Previously indexed lanes that no longer exist
    pub dropped: Vec<LaneKey>,
}

/// Lanes of every known fleet.
#[derive(Debug, Default)]
pub struct LaneIndex {
    /// Per fleet, sorted by lane index
    fleets: HashMap<String, Vec<Lane>>,
}

impl LaneIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `fleet`'s lanes with those of `graph`.
    ///
    /// An invalid graph is rejected and the fleet keeps its previous lanes.
    pub fn rebuild(
        &mut self,
        fleet: &str,
        graph: &NavGraph,
        lane_width: f64,
    ) -> Result<LaneRebuild, LaneGuardError> {
        graph.validate()?;

        let mut lanes = Vec::with_capacity(graph.lanes.len());
        let mut skipped = 0;
        for (index, graph_lane) in graph.lanes.iter().enumerate() {
            let entry = &graph.waypoints[graph_lane.entry];
            let exit = &graph.waypoints[graph_lane.exit];
            match OrientedBox::from_segment([entry.x, entry.y], [exit.x, exit.y], lane_width) {
                Some(footprint) => lanes.push(Lane {
                    key: LaneKey::new(fleet, index),
                    footprint,
                    speed_limit: graph_lane.speed_limit,
                }),
                None => {
                    warn!(fleet, lane = index, "Skipping zero-length lane");
                    skipped += 1;
                }
            }
        }

        let kept: HashSet<usize> = lanes.iter().map(|lane| lane.key.index).collect();
        let dropped = self
            .fleets
            .get(fleet)
            .map(|old| {
                old.iter()
                    .filter(|lane| !kept.contains(&lane.key.index))
                    .map(|lane| lane.key.clone())
                    .collect()
            })
            .unwrap_or_default();

        let indexed = lanes.len();
        debug!(fleet, indexed, skipped, "Rebuilt lane index");
        self.fleets.insert(fleet.to_string(), lanes);

        Ok(LaneRebuild {
            indexed,
            skipped,
            dropped,
        })
    }

    pub fn get(&self, key: &LaneKey) -> Option<&Lane> {
        let lanes = self.fleets.get(&key.fleet)?;
        lanes
            .binary_search_by_key(&key.index, |lane| lane.key.index)
            .ok()
            .map(|pos| &lanes[pos])
    }

    pub fn contains(&self, key: &LaneKey) -> bool {
        self.get(key).is_some()
    }

    /// Every lane of every fleet.
    pub fn iter(&self) -> impl Iterator<Item = &Lane> {
        self.fleets.values().flatten()
    }

    pub fn fleet_lanes(&self, fleet: &str) -> &[Lane] {
        self.fleets.get(fleet).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_fleet(&self, fleet: &str) -> bool {
        self.fleets.contains_key(fleet)
    }

    pub fn fleet_count(&self) -> usize {
        self.fleets.len()
    }

    pub fn len(&self) -> usize {
        self.fleets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
