//! Association - which lanes each obstacle is in the vicinity of, and what
//! that means for the lanes' open/closed state.
//!
//! An obstacle is in a lane's vicinity when their boxes intersect or are
//! separated by no more than `obstacle_lane_threshold`. A lane closes once
//! its vicinity count reaches `lane_closure_threshold` and reopens only when
//! the count is back to zero.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::blocker::LaneBlocker;
use crate::error::LaneGuardError;
use crate::geometry::intersects;
use crate::keys::{LaneKey, ObstacleKey};
use crate::requests::LaneTransition;

impl LaneBlocker {
    /// Bring one obstacle's vicinity links up to date.
    ///
    /// Returns the lanes that gained or lost the obstacle. An obstacle that is
    /// no longer stored loses all of its links.
    pub fn recompute(&mut self, key: &ObstacleKey) -> Result<BTreeSet<LaneKey>, LaneGuardError> {
        let Some(record) = self.obstacles.get(key) else {
            return Ok(self.vicinity.remove_obstacle(key).into_iter().collect());
        };

        let threshold = self.config.obstacle_lane_threshold;
        let current: BTreeSet<LaneKey> = self
            .lanes
            .iter()
            .filter(|lane| intersects(&record.footprint, &lane.footprint).within(threshold))
            .map(|lane| lane.key.clone())
            .collect();
        let previous: BTreeSet<LaneKey> = self.vicinity.lanes_of(key).into_iter().collect();

        let mut affected = BTreeSet::new();
        for lane in current.difference(&previous) {
            if self.vicinity.link(key, lane) {
                affected.insert(lane.clone());
            }
        }
        for lane in previous.difference(&current) {
            if self.vicinity.unlink(key, lane) {
                affected.insert(lane.clone());
            }
        }

        if !affected.is_empty() {
            debug!(
                obstacle = %key,
                lanes = current.len(),
                changed = affected.len(),
                "Vicinity updated"
            );
        }
        Ok(affected)
    }

    /// Recompute every stored obstacle.
    pub fn recompute_all(&mut self) -> Result<BTreeSet<LaneKey>, LaneGuardError> {
        let keys: Vec<ObstacleKey> = self.obstacles.keys().cloned().collect();
        let mut affected = BTreeSet::new();
        for key in &keys {
            affected.append(&mut self.recompute(key)?);
        }
        Ok(affected)
    }

    /// Apply the closure rule to each affected lane.
    ///
    /// Returns the lanes whose state actually changed, in key order. A lane
    /// that is not indexed means the vicinity index references a lane it
    /// should have forgotten, which is fatal.
    pub fn decide_closures(
        &mut self,
        affected: impl IntoIterator<Item = LaneKey>,
    ) -> Result<Vec<LaneTransition>, LaneGuardError> {
        let threshold = self.config.lane_closure_threshold;
        let mut transitions = Vec::new();

        for lane in affected {
            if !self.lanes.contains(&lane) {
                return Err(LaneGuardError::UnknownLane(lane));
            }
            let count = self.vicinity.count(&lane);
            let closed = self.closed.contains(&lane);

            if !closed && count >= threshold {
                info!(lane = %lane, obstacles = count, "Closing lane");
                self.closed.insert(lane.clone());
                transitions.push(LaneTransition::Closed(lane));
            } else if closed && count == 0 {
                info!(lane = %lane, "Reopening lane");
                self.closed.remove(&lane);
                transitions.push(LaneTransition::Reopened(lane));
            }
        }
        Ok(transitions)
    }

    /// Recompute every obstacle, then decide once over all affected lanes.
    pub fn full_pass(&mut self) -> Result<Vec<LaneTransition>, LaneGuardError> {
        let affected = self.recompute_all()?;
        self.decide_closures(affected)
    }
}

#[cfg(test)]
mod tests {
    use crate::blocker::tests::{blocker, on_lane_0};
    use crate::geometry::OrientedBox;
    use crate::keys::{LaneKey, ObstacleKey};
    use crate::requests::LaneTransition;
    use std::time::Duration;

    fn lane_0() -> LaneKey {
        LaneKey::new("fleet", 0)
    }

    #[test]
    fn test_vicinity_includes_obstacles_within_threshold() {
        let mut blocker = blocker(5);
        // Lane 0 spans y in [-0.25, 0.25]; these boxes are 0.4 tall.
        let near = OrientedBox::new(3.0, 0.6, 0.0, 0.4, 0.4); // gap 0.15
        let far = OrientedBox::new(6.0, 0.8, 0.0, 0.4, 0.4); // gap 0.35
        blocker.observe(ObstacleKey::new("lidar", 1), near, Duration::ZERO).unwrap();
        blocker.observe(ObstacleKey::new("lidar", 2), far, Duration::ZERO).unwrap();

        assert_eq!(blocker.vicinity().count(&lane_0()), 1);
        assert!(blocker.vicinity().contains(&ObstacleKey::new("lidar", 1), &lane_0()));
    }

    #[test]
    fn test_closes_exactly_at_threshold() {
        let mut blocker = blocker(3);
        let mut transitions = Vec::new();
        for id in 0..5 {
            transitions.extend(
                blocker
                    .observe(
                        ObstacleKey::new("lidar", id),
                        on_lane_0(1.0 + id as f64),
                        Duration::ZERO,
                    )
                    .unwrap(),
            );
            assert_eq!(blocker.is_closed(&lane_0()), id >= 2);
        }
        assert_eq!(transitions, vec![LaneTransition::Closed(lane_0())]);
    }

    #[test]
    fn test_below_threshold_never_closes() {
        let mut blocker = blocker(3);
        for id in 0..2 {
            let transitions = blocker
                .observe(ObstacleKey::new("lidar", id), on_lane_0(2.0 * id as f64), Duration::ZERO)
                .unwrap();
            assert!(transitions.is_empty());
        }
        assert!(blocker.full_pass().unwrap().is_empty());
    }

    #[test]
    fn test_reopens_only_when_empty() {
        let mut blocker = blocker(2);
        blocker.observe(ObstacleKey::new("lidar", 1), on_lane_0(2.0), Duration::ZERO).unwrap();
        blocker.observe(ObstacleKey::new("lidar", 2), on_lane_0(4.0), Duration::ZERO).unwrap();
        assert!(blocker.is_closed(&lane_0()));

        // One obstacle leaves: count 1 is below threshold but the lane stays closed.
        let away = OrientedBox::new(2.0, -3.0, 0.0, 0.4, 0.4);
        let transitions = blocker
            .observe(ObstacleKey::new("lidar", 1), away, Duration::ZERO)
            .unwrap();
        assert!(transitions.is_empty());
        assert!(blocker.is_closed(&lane_0()));

        let transitions = blocker
            .observe(ObstacleKey::new("lidar", 2), away, Duration::from_secs(1))
            .unwrap();
        assert_eq!(transitions, vec![LaneTransition::Reopened(lane_0())]);
    }

    #[test]
    fn test_moving_obstacle_changes_lane() {
        let mut blocker = blocker(1);
        let key = ObstacleKey::new("lidar", 7);
        blocker.observe(key.clone(), on_lane_0(2.0), Duration::ZERO).unwrap();

        let on_lane_1 = OrientedBox::new(2.0, 5.0, 0.0, 0.4, 0.4);
        let transitions = blocker.observe(key.clone(), on_lane_1, Duration::ZERO).unwrap();

        assert_eq!(
            transitions,
            vec![
                LaneTransition::Reopened(lane_0()),
                LaneTransition::Closed(LaneKey::new("fleet", 1)),
            ]
        );
        blocker.check_consistency().unwrap();
    }

    #[test]
    fn test_obstacle_spanning_both_lanes() {
        let mut blocker = blocker(1);
        let wall = OrientedBox::new(5.0, 2.5, 0.0, 0.4, 6.0);
        let transitions = blocker
            .observe(ObstacleKey::new("lidar", 1), wall, Duration::ZERO)
            .unwrap();
        assert_eq!(transitions.len(), 2);
        assert_eq!(blocker.vicinity().pair_count(), 2);
    }

    #[test]
    fn test_full_pass_is_idempotent() {
        let mut blocker = blocker(2);
        for id in 0..3 {
            let footprint = on_lane_0(id as f64 * 3.0);
            blocker
                .observe(ObstacleKey::new("lidar", id), footprint, Duration::ZERO)
                .unwrap();
        }
        assert!(blocker.full_pass().unwrap().is_empty());
        assert!(blocker.recompute_all().unwrap().is_empty());
        blocker.check_consistency().unwrap();
    }

    #[test]
    fn test_decide_on_unindexed_lane_is_fatal() {
        let mut blocker = blocker(1);
        let err = blocker.decide_closures([LaneKey::new("ghost", 0)]).unwrap_err();
        assert!(err.is_fatal());
    }
}
