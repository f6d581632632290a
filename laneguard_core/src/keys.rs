//! Value identities for obstacles and lanes.
//!
//! Both sides of the vicinity index are keyed by these plain values, never by
//! the records they name. The textual form `"<name>_<number>"` is what the
//! lane blocker logs and what external tooling hands back to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LaneGuardError;

/// Identity of an obstacle: detecting source plus source-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleKey {
    pub source: String,
    pub id: u64,
}

impl ObstacleKey {
    pub fn new(source: impl Into<String>, id: u64) -> Self {
        Self {
            source: source.into(),
            id,
        }
    }
}

/// Identity of a lane: fleet name plus index of the lane in the fleet's graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneKey {
    pub fleet: String,
    pub index: usize,
}

impl LaneKey {
    pub fn new(fleet: impl Into<String>, index: usize) -> Self {
        Self {
            fleet: fleet.into(),
            index,
        }
    }
}

impl fmt::Display for ObstacleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source, self.id)
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.fleet, self.index)
    }
}

/// Split `"<name>_<number>"` at the last underscore. Names may themselves
/// contain underscores; the number may not.
fn split_key(key: &str) -> Result<(&str, &str), LaneGuardError> {
    match key.rsplit_once('_') {
        Some((name, number)) if !name.is_empty() && !number.is_empty() => Ok((name, number)),
        _ => Err(LaneGuardError::MalformedKey(key.to_string())),
    }
}

impl FromStr for ObstacleKey {
    type Err = LaneGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, id) = split_key(s)?;
        let id = id
            .parse::<u64>()
            .map_err(|_| LaneGuardError::MalformedKey(s.to_string()))?;
        Ok(Self::new(source, id))
    }
}

impl FromStr for LaneKey {
    type Err = LaneGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fleet, index) = split_key(s)?;
        let index = index
            .parse::<usize>()
            .map_err(|_| LaneGuardError::MalformedKey(s.to_string()))?;
        Ok(Self::new(fleet, index))
    }
}
