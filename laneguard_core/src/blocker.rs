//! The lane blocker state: obstacle store, lane index, vicinity index and the
//! closed-lane set, mutated together.
//!
//! `LaneBlocker` is plain synchronous state. It never locks and never awaits;
//! [`crate::runtime`] wraps it in the single critical section that keeps the
//! three structures consistent with each other. The association and culling
//! passes live in their own modules as further `impl LaneBlocker` blocks.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{info, warn};

use laneguard_env::OutboundRequest;

use crate::config::LaneBlockerConfig;
use crate::error::LaneGuardError;
use crate::geometry::OrientedBox;
use crate::keys::{LaneKey, ObstacleKey};
use crate::lanes::{LaneIndex, NavGraph};
use crate::obstacles::ObstacleStore;
use crate::requests::{ExternalLaneStates, LaneTransition, RequestPlanner};
use crate::vicinity::VicinityIndex;

pub struct LaneBlocker {
    pub(crate) config: LaneBlockerConfig,
    pub(crate) obstacles: ObstacleStore,
    pub(crate) lanes: LaneIndex,
    pub(crate) vicinity: VicinityIndex,
    pub(crate) closed: BTreeSet<LaneKey>,
    pub(crate) planner: RequestPlanner,
}

impl LaneBlocker {
    pub fn new(config: LaneBlockerConfig) -> Result<Self, LaneGuardError> {
        config.validate()?;
        let planner = RequestPlanner::new(config.mitigation);
        Ok(Self {
            config,
            obstacles: ObstacleStore::new(),
            lanes: LaneIndex::new(),
            vicinity: VicinityIndex::new(),
            closed: BTreeSet::new(),
            planner,
        })
    }

    pub fn config(&self) -> &LaneBlockerConfig {
        &self.config
    }

    /// Record an observation already expressed in the common frame.
    ///
    /// With continuous checking on, the obstacle's vicinity is recomputed and
    /// closures decided right away; otherwise the next full pass picks it up.
    pub fn observe(
        &mut self,
        key: ObstacleKey,
        footprint: OrientedBox,
        observed_at: Duration,
    ) -> Result<Vec<LaneTransition>, LaneGuardError> {
        self.obstacles
            .upsert(key.clone(), footprint, observed_at, self.config.obstacle_ttl);
        if !self.config.continuous_checking {
            return Ok(Vec::new());
        }
        let affected = self.recompute(&key)?;
        self.decide_closures(affected)
    }

    /// Replace a fleet's lanes and run a full pass against the new lanes.
    ///
    /// Lanes missing from the new graph stop being tracked. A dropped lane
    /// that was closed is forgotten without a reopen request.
    pub fn update_graph(
        &mut self,
        fleet: &str,
        graph: &NavGraph,
    ) -> Result<Vec<LaneTransition>, LaneGuardError> {
        let rebuild = self.lanes.rebuild(fleet, graph, self.config.lane_width)?;
        info!(
            fleet,
            lanes = rebuild.indexed,
            skipped = rebuild.skipped,
            dropped = rebuild.dropped.len(),
            "Navigation graph updated"
        );

        for lane in &rebuild.dropped {
            self.vicinity.remove_lane(lane);
            self.planner.forget(lane);
            if self.closed.remove(lane) {
                warn!(lane = %lane, "Closed lane no longer in graph; dropping without reopen");
            }
        }

        self.full_pass()
    }

    pub fn update_lane_states(&mut self, fleet: &str, states: ExternalLaneStates) {
        self.planner.update_lane_states(fleet, states);
    }

    /// Outbound requests for the transitions of one pass.
    pub fn plan_requests(&mut self, transitions: &[LaneTransition]) -> Vec<OutboundRequest> {
        self.planner.plan(transitions)
    }

    pub fn obstacles(&self) -> &ObstacleStore {
        &self.obstacles
    }

    pub fn lanes(&self) -> &LaneIndex {
        &self.lanes
    }

    pub fn vicinity(&self) -> &VicinityIndex {
        &self.vicinity
    }

    pub fn is_closed(&self, lane: &LaneKey) -> bool {
        self.closed.contains(lane)
    }

    pub fn closed_lanes(&self) -> impl Iterator<Item = &LaneKey> {
        self.closed.iter()
    }

    /// Verify the cross-structure invariants: the vicinity index mirrors
    /// itself, only stored obstacles and indexed lanes appear in it, and every
    /// closed lane is indexed.
    pub fn check_consistency(&self) -> Result<(), LaneGuardError> {
        self.vicinity.check_consistency()?;
        for (lane, _) in self.vicinity.occupied_lanes() {
            if !self.lanes.contains(lane) {
                return Err(LaneGuardError::IndexInconsistent(format!(
                    "vicinity references unindexed lane {lane}"
                )));
            }
            for obstacle in self.vicinity.obstacles_of(lane) {
                if self.obstacles.get(&obstacle).is_none() {
                    return Err(LaneGuardError::IndexInconsistent(format!(
                        "vicinity references unknown obstacle {obstacle}"
                    )));
                }
            }
        }
        if let Some(lane) = self.closed.iter().find(|lane| !self.lanes.contains(lane)) {
            return Err(LaneGuardError::UnknownLane(lane.clone()));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> BlockerSnapshot {
        BlockerSnapshot {
            obstacles: self.obstacles.len(),
            fleets: self.lanes.fleet_count(),
            lanes: self.lanes.len(),
            closed: self.closed.iter().cloned().collect(),
            vicinity: self
                .vicinity
                .occupied_lanes()
                .map(|(lane, count)| (lane.to_string(), count))
                .collect(),
        }
    }
}

/// Point-in-time view of the blocker, taken under the lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockerSnapshot {
    pub obstacles: usize,
    pub fleets: usize,
    pub lanes: usize,
    pub closed: Vec<LaneKey>,

    /// Vicinity obstacle count per occupied lane, keyed `"<fleet>_<index>"`
    pub vicinity: BTreeMap<String, usize>,
}
