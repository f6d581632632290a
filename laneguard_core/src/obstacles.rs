//! Obstacle Store - latest known footprint per obstacle identity.
//!
//! One record per `(source, id)`. A new observation replaces the previous
//! record outright and restarts its expiry; nothing is merged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::geometry::OrientedBox;
use crate::keys::ObstacleKey;

/// Last known state of one obstacle, in the common reference frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleRecord {
    pub key: ObstacleKey,

    /// Footprint in the common reference frame
    pub footprint: OrientedBox,

    /// Observation time (context clock)
    pub observed_at: Duration,

    /// `observed_at + ttl`
    pub expires_at: Duration,
}

impl ObstacleRecord {
    /// Expired once `now` has reached the expiry time.
    #[inline]
    pub fn is_expired(&self, now: Duration) -> bool {
        self.expires_at <= now
    }
}

/// All currently tracked obstacles.
#[derive(Debug, Default)]
pub struct ObstacleStore {
    records: HashMap<ObstacleKey, ObstacleRecord>,
}

impl ObstacleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `key`; expiry becomes `observed_at + ttl`.
    pub fn upsert(
        &mut self,
        key: ObstacleKey,
        footprint: OrientedBox,
        observed_at: Duration,
        ttl: Duration,
    ) {
        let record = ObstacleRecord {
            key: key.clone(),
            footprint,
            observed_at,
            expires_at: observed_at.saturating_add(ttl),
        };
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &ObstacleKey) -> Option<&ObstacleRecord> {
        self.records.get(key)
    }

    /// Snapshot of every record, in no particular order.
    pub fn get_all(&self) -> Vec<ObstacleRecord> {
        self.records.values().cloned().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ObstacleKey> {
        self.records.keys()
    }

    pub fn remove(&mut self, key: &ObstacleKey) -> Option<ObstacleRecord> {
        self.records.remove(key)
    }

    /// Keys of every record whose expiry time is at or before `now`.
    pub fn expired(&self, now: Duration) -> Vec<ObstacleKey> {
        self.records
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint(x: f64) -> OrientedBox {
        OrientedBox::new(x, 0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn test_upsert_replaces_and_resets_expiry() {
        let mut store = ObstacleStore::new();
        let key = ObstacleKey::new("lidar", 1);

        store.upsert(key.clone(), footprint(0.0), Duration::from_secs(1), Duration::from_secs(2));
        store.upsert(key.clone(), footprint(5.0), Duration::from_secs(4), Duration::from_secs(2));

        assert_eq!(store.len(), 1);
        let record = store.get(&key).unwrap();
        assert_eq!(record.footprint.center.x, 5.0);
        assert_eq!(record.observed_at, Duration::from_secs(4));
        assert_eq!(record.expires_at, Duration::from_secs(6));
    }

    #[test]
    fn test_same_id_from_different_sources_are_distinct() {
        let mut store = ObstacleStore::new();
        let ttl = Duration::from_secs(1);
        store.upsert(ObstacleKey::new("lidar", 1), footprint(0.0), Duration::ZERO, ttl);
        store.upsert(ObstacleKey::new("camera", 1), footprint(0.0), Duration::ZERO, ttl);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_all().len(), 2);
    }

    #[test]
    fn test_expired_includes_boundary() {
        let mut store = ObstacleStore::new();
        let ttl = Duration::from_secs(2);
        store.upsert(ObstacleKey::new("lidar", 1), footprint(0.0), Duration::ZERO, ttl);
        store.upsert(ObstacleKey::new("lidar", 2), footprint(0.0), Duration::from_secs(1), ttl);

        assert!(store.expired(Duration::from_millis(1999)).is_empty());
        assert_eq!(store.expired(Duration::from_secs(2)), vec![ObstacleKey::new("lidar", 1)]);
        assert_eq!(store.expired(Duration::from_secs(3)).len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut store = ObstacleStore::new();
        let key = ObstacleKey::new("lidar", 1);
        store.upsert(key.clone(), footprint(0.0), Duration::ZERO, Duration::from_secs(1));
        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert!(store.is_empty());
    }
}
