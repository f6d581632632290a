//! Culling - expiry of obstacles that were not observed again in time.

use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::blocker::LaneBlocker;
use crate::error::LaneGuardError;
use crate::requests::LaneTransition;

impl LaneBlocker {
    /// Remove every obstacle whose expiry time is at or before `now`, unlink
    /// it from its lanes and reopen lanes left empty.
    pub fn cull(&mut self, now: Duration) -> Result<Vec<LaneTransition>, LaneGuardError> {
        let expired = self.obstacles.expired(now);
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let mut affected = BTreeSet::new();
        for key in &expired {
            self.obstacles.remove(key);
            affected.extend(self.vicinity.remove_obstacle(key));
        }
        debug!(
            culled = expired.len(),
            remaining = self.obstacles.len(),
            lanes = affected.len(),
            "Culled expired obstacles"
        );

        self.decide_closures(affected)
    }
}
