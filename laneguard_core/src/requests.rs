//! Turning lane state transitions into outbound requests.
//!
//! A pass yields [`LaneTransition`]s. The [`RequestPlanner`] maps each one to
//! lane and/or speed-limit requests according to the mitigation policy, and
//! reconciles closures with the externally reported lane states: a lane that
//! some other actor already closed is never closed or reopened by us.
//!
//! The feed also echoes our own requests, and lags behind them. After we
//! reopen a lane, its reported closure is treated as our stale echo until the
//! feed shows the lane open again.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use laneguard_env::{LaneRequest, OutboundRequest, SpeedLimitRequest};

use crate::config::MitigationPolicy;
use crate::keys::LaneKey;

/// A lane whose open/closed state changed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LaneTransition {
    Closed(LaneKey),
    Reopened(LaneKey),
}

impl LaneTransition {
    pub fn lane(&self) -> &LaneKey {
        match self {
            LaneTransition::Closed(lane) | LaneTransition::Reopened(lane) => lane,
        }
    }

    pub fn is_closure(&self) -> bool {
        matches!(self, LaneTransition::Closed(_))
    }
}

/// Lane states of one fleet as reported by the lane-state feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalLaneStates {
    /// Lane indices closed by any actor
    #[serde(default)]
    pub closed: BTreeSet<usize>,

    /// Speed limits currently in force, by lane index
    #[serde(default)]
    pub speed_limits: BTreeMap<usize, f64>,
}

impl ExternalLaneStates {
    pub fn new(closed: impl IntoIterator<Item = usize>) -> Self {
        Self {
            closed: closed.into_iter().collect(),
            speed_limits: BTreeMap::new(),
        }
    }

    pub fn is_closed(&self, lane_index: usize) -> bool {
        self.closed.contains(&lane_index)
    }

    pub fn speed_limit(&self, lane_index: usize) -> Option<f64> {
        self.speed_limits.get(&lane_index).copied()
    }
}

/// Maps transitions to requests.
#[derive(Debug, Default)]
pub struct RequestPlanner {
    policy: MitigationPolicy,

    /// Latest lane states per fleet
    external: HashMap<String, ExternalLaneStates>,

    /// Lanes we hold closed whose closure request was withheld because the
    /// feed already reported them closed
    suppressed: HashSet<LaneKey>,

    /// Lanes we reopened that the feed has not yet reported open
    unacknowledged_reopens: HashSet<LaneKey>,
}

impl RequestPlanner {
    pub fn new(policy: MitigationPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> MitigationPolicy {
        self.policy
    }

    /// Replace the fleet's reported lane states.
    pub fn update_lane_states(&mut self, fleet: &str, states: ExternalLaneStates) {
        debug!(
            fleet,
            closed = states.closed.len(),
            limited = states.speed_limits.len(),
            "Lane states updated"
        );
        self.unacknowledged_reopens
            .retain(|lane| lane.fleet != fleet || states.is_closed(lane.index));
        self.external.insert(fleet.to_string(), states);
    }

    pub fn lane_states(&self, fleet: &str) -> Option<&ExternalLaneStates> {
        self.external.get(fleet)
    }

    /// Closed by someone else, as far as the feed is current.
    fn externally_closed(&self, lane: &LaneKey) -> bool {
        !self.unacknowledged_reopens.contains(lane)
            && self
                .external
                .get(&lane.fleet)
                .is_some_and(|states| states.is_closed(lane.index))
    }

    pub fn is_suppressed(&self, lane: &LaneKey) -> bool {
        self.suppressed.contains(lane)
    }

    /// Stop tracking a lane that no longer exists.
    pub fn forget(&mut self, lane: &LaneKey) {
        self.suppressed.remove(lane);
        self.unacknowledged_reopens.remove(lane);
    }

    /// Requests for a batch of transitions, in transition order.
    pub fn plan(&mut self, transitions: &[LaneTransition]) -> Vec<OutboundRequest> {
        let mut requests = Vec::new();
        for transition in transitions {
            let lane = transition.lane();

            if self.policy.closes_lanes() {
                match transition {
                    LaneTransition::Closed(_) if self.externally_closed(lane) => {
                        debug!(lane = %lane, "Lane closed externally, withholding close request");
                        self.suppressed.insert(lane.clone());
                    }
                    LaneTransition::Reopened(_) if self.suppressed.remove(lane) => {
                        debug!(lane = %lane, "Leaving externally imposed closure in place");
                    }
                    LaneTransition::Closed(_) => {
                        self.unacknowledged_reopens.remove(lane);
                        requests.push(OutboundRequest::Lane(LaneRequest::close(
                            lane.fleet.clone(),
                            lane.index,
                        )));
                    }
                    LaneTransition::Reopened(_) => {
                        self.unacknowledged_reopens.insert(lane.clone());
                        requests.push(OutboundRequest::Lane(LaneRequest::open(
                            lane.fleet.clone(),
                            lane.index,
                        )));
                    }
                }
            }

            if let Some(limit) = self.policy.speed_limit() {
                requests.push(OutboundRequest::SpeedLimit(SpeedLimitRequest {
                    fleet_name: lane.fleet.clone(),
                    lane_index: lane.index,
                    limit: transition.is_closure().then_some(limit),
                }));
            }
        }
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(index: usize) -> LaneKey {
        LaneKey::new("tinyRobot", index)
    }

    #[test]
    fn test_close_policy_emits_lane_requests_only() {
        let mut planner = RequestPlanner::new(MitigationPolicy::Close);
        let requests = planner.plan(&[
            LaneTransition::Closed(lane(1)),
            LaneTransition::Reopened(lane(2)),
        ]);
        assert_eq!(
            requests,
            vec![
                OutboundRequest::Lane(LaneRequest::close("tinyRobot", 1)),
                OutboundRequest::Lane(LaneRequest::open("tinyRobot", 2)),
            ]
        );
    }

    #[test]
    fn test_speed_limit_policy_imposes_and_lifts() {
        let mut planner = RequestPlanner::new(MitigationPolicy::SpeedLimit { limit: 0.3 });
        let requests = planner.plan(&[
            LaneTransition::Closed(lane(1)),
            LaneTransition::Reopened(lane(1)),
        ]);
        let limits: Vec<Option<f64>> = requests
            .iter()
            .map(|request| match request {
                OutboundRequest::SpeedLimit(r) => r.limit,
                OutboundRequest::Lane(_) => panic!("unexpected lane request"),
            })
            .collect();
        assert_eq!(limits, vec![Some(0.3), None]);
    }

    #[test]
    fn test_close_and_speed_limit_emits_both() {
        let mut planner = RequestPlanner::new(MitigationPolicy::CloseAndSpeedLimit { limit: 0.5 });
        let requests = planner.plan(&[LaneTransition::Closed(lane(4))]);
        assert_eq!(requests.len(), 2);
        assert!(matches!(&requests[0], OutboundRequest::Lane(r) if r.closed));
        assert!(matches!(&requests[1], OutboundRequest::SpeedLimit(r) if r.limit == Some(0.5)));
    }

    #[test]
    fn test_externally_closed_lane_is_neither_closed_nor_reopened() {
        let mut planner = RequestPlanner::new(MitigationPolicy::Close);
        planner.update_lane_states("tinyRobot", ExternalLaneStates::new([1]));

        assert!(planner.plan(&[LaneTransition::Closed(lane(1))]).is_empty());
        assert!(planner.is_suppressed(&lane(1)));

        // External state changes in between do not matter: we never closed it.
        planner.update_lane_states("tinyRobot", ExternalLaneStates::default());
        assert!(planner.plan(&[LaneTransition::Reopened(lane(1))]).is_empty());
        assert!(!planner.is_suppressed(&lane(1)));

        // The next closure is ours again.
        assert_eq!(planner.plan(&[LaneTransition::Closed(lane(1))]).len(), 1);
    }

    #[test]
    fn test_stale_echo_of_our_closure_does_not_block_reclosing() {
        let mut planner = RequestPlanner::new(MitigationPolicy::Close);
        let close = OutboundRequest::Lane(LaneRequest::close("tinyRobot", 1));

        assert_eq!(planner.plan(&[LaneTransition::Closed(lane(1))]), vec![close.clone()]);
        // The feed echoes our closure.
        planner.update_lane_states("tinyRobot", ExternalLaneStates::new([1]));
        assert_eq!(
            planner.plan(&[LaneTransition::Reopened(lane(1))]),
            vec![OutboundRequest::Lane(LaneRequest::open("tinyRobot", 1))]
        );

        // Obstacles return before the feed reports the reopening.
        assert_eq!(planner.plan(&[LaneTransition::Closed(lane(1))]), vec![close.clone()]);
        assert!(!planner.is_suppressed(&lane(1)));
    }

    #[test]
    fn test_closure_after_acknowledged_reopen_is_external() {
        let mut planner = RequestPlanner::new(MitigationPolicy::Close);
        planner.plan(&[LaneTransition::Closed(lane(1))]);
        planner.plan(&[LaneTransition::Reopened(lane(1))]);

        // Still closed in this report: our reopen is not visible yet.
        planner.update_lane_states("tinyRobot", ExternalLaneStates::new([1]));
        assert_eq!(planner.plan(&[LaneTransition::Closed(lane(1))]).len(), 1);
        planner.plan(&[LaneTransition::Reopened(lane(1))]);

        // The feed shows it open, then someone else closes it.
        planner.update_lane_states("tinyRobot", ExternalLaneStates::default());
        planner.update_lane_states("tinyRobot", ExternalLaneStates::new([1]));
        assert!(planner.plan(&[LaneTransition::Closed(lane(1))]).is_empty());
        assert!(planner.is_suppressed(&lane(1)));
    }

    #[test]
    fn test_other_fleets_are_unaffected_by_lane_states() {
        let mut planner = RequestPlanner::new(MitigationPolicy::Close);
        planner.update_lane_states("deliveryRobot", ExternalLaneStates::new([1]));
        assert_eq!(planner.plan(&[LaneTransition::Closed(lane(1))]).len(), 1);
    }

    #[test]
    fn test_lane_states_from_json() {
        let states: ExternalLaneStates =
            serde_json::from_str(r#"{"closed": [3, 1], "speed_limits": {"2": 0.4}}"#).unwrap();
        assert!(states.is_closed(1));
        assert!(!states.is_closed(2));
        assert_eq!(states.speed_limit(2), Some(0.4));
    }
}
