//! Deterministic lane blocker scenarios.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// LG-001: obstacles pile up in a corridor, then walk away
    CorridorBlockage,

    /// LG-002: obstacles that never reach the closure threshold
    BelowThreshold,

    /// LG-003: the sensor goes quiet and closures expire
    SensorDropout,

    /// LG-004: graph updates drop and restore closed lanes
    GraphRefresh,

    /// LG-005: the sensor frame disappears, then lags past the timeout
    TransformOutage,

    /// LG-006: many wandering obstacles, speed limits as well as closures
    Crowd,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CorridorBlockage,
            ScenarioId::BelowThreshold,
            ScenarioId::SensorDropout,
            ScenarioId::GraphRefresh,
            ScenarioId::TransformOutage,
            ScenarioId::Crowd,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CorridorBlockage => "corridor_blockage",
            ScenarioId::BelowThreshold => "below_threshold",
            ScenarioId::SensorDropout => "sensor_dropout",
            ScenarioId::GraphRefresh => "graph_refresh",
            ScenarioId::TransformOutage => "transform_outage",
            ScenarioId::Crowd => "crowd",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CorridorBlockage => {
                "obstacles close a corridor and it reopens once they leave; \
                 an externally closed lane is left alone"
            }
            ScenarioId::BelowThreshold => "one obstacle short of the threshold: no requests",
            ScenarioId::SensorDropout => "sensor goes quiet; closures are lifted by expiry",
            ScenarioId::GraphRefresh => {
                "closed lanes vanish from the graph without reopen, then come back closed"
            }
            ScenarioId::TransformOutage => {
                "missing frame and slow lookups drop observations until the tree recovers"
            }
            ScenarioId::Crowd => "40 wandering obstacles, closures paired with speed limits",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corridor_blockage" | "corridorblockage" | "lg-001" => Ok(ScenarioId::CorridorBlockage),
            "below_threshold" | "belowthreshold" | "lg-002" => Ok(ScenarioId::BelowThreshold),
            "sensor_dropout" | "sensordropout" | "lg-003" => Ok(ScenarioId::SensorDropout),
            "graph_refresh" | "graphrefresh" | "lg-004" => Ok(ScenarioId::GraphRefresh),
            "transform_outage" | "transformoutage" | "lg-005" => Ok(ScenarioId::TransformOutage),
            "crowd" | "lg-006" => Ok(ScenarioId::Crowd),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
