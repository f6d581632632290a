//! Obstacle↔Lane vicinity index.
//!
//! Two maps that mirror each other: obstacle → lanes in its vicinity and
//! lane → obstacles in its vicinity. Every mutation goes through `link` /
//! `unlink` (or the bulk removals built on them), which touch both sides.
//! Empty sets are removed so that "absent" and "empty" mean the same thing.

use std::collections::{HashMap, HashSet};

use crate::error::LaneGuardError;
use crate::keys::{LaneKey, ObstacleKey};

#[derive(Debug, Default)]
pub struct VicinityIndex {
    obstacle_to_lanes: HashMap<ObstacleKey, HashSet<LaneKey>>,
    lane_to_obstacles: HashMap<LaneKey, HashSet<ObstacleKey>>,
}

impl VicinityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `obstacle` is in the vicinity of `lane`.
    /// Returns false if the pair was already linked.
    pub fn link(&mut self, obstacle: &ObstacleKey, lane: &LaneKey) -> bool {
        let inserted = self
            .obstacle_to_lanes
            .entry(obstacle.clone())
            .or_default()
            .insert(lane.clone());
        self.lane_to_obstacles
            .entry(lane.clone())
            .or_default()
            .insert(obstacle.clone());
        inserted
    }

    /// Remove the pair from both sides. Returns false if it was not linked.
    pub fn unlink(&mut self, obstacle: &ObstacleKey, lane: &LaneKey) -> bool {
        let removed = remove_from(&mut self.obstacle_to_lanes, obstacle, lane);
        remove_from(&mut self.lane_to_obstacles, lane, obstacle);
        removed
    }

    /// Unlink an obstacle from every lane; returns the lanes it was linked to.
    pub fn remove_obstacle(&mut self, obstacle: &ObstacleKey) -> Vec<LaneKey> {
        let lanes: Vec<LaneKey> = self
            .obstacle_to_lanes
            .remove(obstacle)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for lane in &lanes {
            remove_from(&mut self.lane_to_obstacles, lane, obstacle);
        }
        lanes
    }

    /// Unlink a lane from every obstacle; returns the obstacles it was linked to.
    pub fn remove_lane(&mut self, lane: &LaneKey) -> Vec<ObstacleKey> {
        let obstacles: Vec<ObstacleKey> = self
            .lane_to_obstacles
            .remove(lane)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for obstacle in &obstacles {
            remove_from(&mut self.obstacle_to_lanes, obstacle, lane);
        }
        obstacles
    }

    /// Lanes currently in the vicinity of `obstacle`.
    pub fn lanes_of(&self, obstacle: &ObstacleKey) -> HashSet<LaneKey> {
        self.obstacle_to_lanes
            .get(obstacle)
            .cloned()
            .unwrap_or_default()
    }

    /// Obstacles currently in the vicinity of `lane`.
    pub fn obstacles_of(&self, lane: &LaneKey) -> HashSet<ObstacleKey> {
        self.lane_to_obstacles
            .get(lane)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of obstacles in the vicinity of `lane`.
    pub fn count(&self, lane: &LaneKey) -> usize {
        self.lane_to_obstacles.get(lane).map_or(0, HashSet::len)
    }

    pub fn contains(&self, obstacle: &ObstacleKey, lane: &LaneKey) -> bool {
        self.obstacle_to_lanes
            .get(obstacle)
            .is_some_and(|lanes| lanes.contains(lane))
    }

    /// Lanes with at least one obstacle in their vicinity.
    pub fn occupied_lanes(&self) -> impl Iterator<Item = (&LaneKey, usize)> {
        self.lane_to_obstacles.iter().map(|(lane, set)| (lane, set.len()))
    }

    /// Total number of linked pairs.
    pub fn pair_count(&self) -> usize {
        self.obstacle_to_lanes.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacle_to_lanes.is_empty() && self.lane_to_obstacles.is_empty()
    }

    /// Verify `l ∈ lanes_of(o) ⇔ o ∈ obstacles_of(l)` and that no empty set
    /// is stored.
    pub fn check_consistency(&self) -> Result<(), LaneGuardError> {
        for (obstacle, lanes) in &self.obstacle_to_lanes {
            if lanes.is_empty() {
                return Err(LaneGuardError::IndexInconsistent(format!(
                    "empty lane set stored for obstacle {obstacle}"
                )));
            }
            for lane in lanes {
                let mirrored = self
                    .lane_to_obstacles
                    .get(lane)
                    .is_some_and(|set| set.contains(obstacle));
                if !mirrored {
                    return Err(LaneGuardError::IndexInconsistent(format!(
                        "lane {lane} missing obstacle {obstacle}"
                    )));
                }
            }
        }
        for (lane, obstacles) in &self.lane_to_obstacles {
            if obstacles.is_empty() {
                return Err(LaneGuardError::IndexInconsistent(format!(
                    "empty obstacle set stored for lane {lane}"
                )));
            }
            for obstacle in obstacles {
                if !self.contains(obstacle, lane) {
                    return Err(LaneGuardError::IndexInconsistent(format!(
                        "obstacle {obstacle} missing lane {lane}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Remove `value` from `map[key]`, dropping the entry once it is empty.
fn remove_from<K, V>(map: &mut HashMap<K, HashSet<V>>, key: &K, value: &V) -> bool
where
    K: std::hash::Hash + Eq,
    V: std::hash::Hash + Eq,
{
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}
