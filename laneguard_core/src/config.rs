//! Lane blocker configuration.
//!
//! Every field has a default, so a JSON file only needs the values it wants
//! to change. Durations are written as fractional seconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::LaneGuardError;

/// Which requests a lane state transition produces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MitigationPolicy {
    /// Close the lane; reopen it when clear
    #[default]
    Close,

    /// Impose `limit` (m/s) instead of closing; lift it when clear
    SpeedLimit { limit: f64 },

    /// Close the lane and impose `limit` as well
    CloseAndSpeedLimit { limit: f64 },
}

impl MitigationPolicy {
    pub fn closes_lanes(&self) -> bool {
        matches!(self, Self::Close | Self::CloseAndSpeedLimit { .. })
    }

    pub fn speed_limit(&self) -> Option<f64> {
        match self {
            Self::Close => None,
            Self::SpeedLimit { limit } | Self::CloseAndSpeedLimit { limit } => Some(*limit),
        }
    }
}

/// Configuration for the LaneBlocker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneBlockerConfig {
    /// Common reference frame obstacles are transformed into (default: "map")
    pub rmf_frame: String,

    /// Time-to-live of an unrefreshed observation (default: 5 s)
    #[serde(with = "secs")]
    pub obstacle_ttl: Duration,

    /// Maximum obstacle-to-lane separation that still counts as vicinity (default: 0.25 m)
    pub obstacle_lane_threshold: f64,

    /// Width of every lane corridor (default: 0.5 m)
    pub lane_width: f64,

    /// Vicinity obstacles required to close a lane (default: 5)
    pub lane_closure_threshold: usize,

    /// Period of the full recompute pass (default: 1 s)
    #[serde(with = "secs")]
    pub process_period: Duration,

    /// Period of the cull pass (default: 0.5 s)
    #[serde(with = "secs")]
    pub cull_period: Duration,

    /// Upper bound on a single transform lookup (default: 0.5 s)
    #[serde(with = "secs")]
    pub transform_lookup_timeout: Duration,

    /// Recompute the observed obstacle on every ingestion (default: true)
    pub continuous_checking: bool,

    /// Requests produced by a lane state transition (default: close)
    pub mitigation: MitigationPolicy,
}

impl Default for LaneBlockerConfig {
    fn default() -> Self {
        Self {
            rmf_frame: "map".to_string(),
            obstacle_ttl: Duration::from_secs(5),
            obstacle_lane_threshold: 0.25,
            lane_width: 0.5,
            lane_closure_threshold: 5,
            process_period: Duration::from_secs(1),
            cull_period: Duration::from_millis(500),
            transform_lookup_timeout: Duration::from_millis(500),
            continuous_checking: true,
            mitigation: MitigationPolicy::Close,
        }
    }
}

impl LaneBlockerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, LaneGuardError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LaneGuardError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), LaneGuardError> {
        let invalid = |msg: &str| Err(LaneGuardError::InvalidConfig(msg.to_string()));

        if self.rmf_frame.is_empty() {
            return invalid("rmf_frame must not be empty");
        }
        if !(self.lane_width > 0.0) {
            return invalid("lane_width must be positive");
        }
        if !(self.obstacle_lane_threshold >= 0.0) {
            return invalid("obstacle_lane_threshold must not be negative");
        }
        if self.lane_closure_threshold == 0 {
            return invalid("lane_closure_threshold must be at least 1");
        }
        if self.obstacle_ttl.is_zero() {
            return invalid("obstacle_ttl must be positive");
        }
        if self.process_period.is_zero() || self.cull_period.is_zero() {
            return invalid("process_period and cull_period must be positive");
        }
        if self.transform_lookup_timeout.is_zero() {
            return invalid("transform_lookup_timeout must be positive");
        }
        if let Some(limit) = self.mitigation.speed_limit() {
            if !(limit > 0.0) {
                return invalid("speed limit must be positive");
            }
        }
        Ok(())
    }
}

/// `Duration` as fractional seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LaneBlockerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.lane_closure_threshold, 5);
        assert_eq!(config.mitigation, MitigationPolicy::Close);
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let config = LaneBlockerConfig::from_json_str(
            r#"{
                "obstacle_ttl": 1.5,
                "lane_closure_threshold": 2,
                "mitigation": {"kind": "close_and_speed_limit", "limit": 0.3}
            }"#,
        )
        .unwrap();

        assert_eq!(config.obstacle_ttl, Duration::from_millis(1500));
        assert_eq!(config.lane_closure_threshold, 2);
        assert_eq!(config.lane_width, 0.5);
        assert!(config.mitigation.closes_lanes());
        assert_eq!(config.mitigation.speed_limit(), Some(0.3));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for json in [
            r#"{"lane_closure_threshold": 0}"#,
            r#"{"lane_width": 0.0}"#,
            r#"{"obstacle_lane_threshold": -1.0}"#,
            r#"{"cull_period": 0.0}"#,
            r#"{"mitigation": {"kind": "speed_limit", "limit": 0.0}}"#,
        ] {
            assert!(
                matches!(
                    LaneBlockerConfig::from_json_str(json),
                    Err(LaneGuardError::InvalidConfig(_))
                ),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_negative_duration_is_a_parse_error() {
        let result = LaneBlockerConfig::from_json_str(r#"{"obstacle_ttl": -2.0}"#);
        assert!(matches!(result, Err(LaneGuardError::Json(_))));
    }

    #[test]
    fn test_serialization_round_trip_keeps_speed_limit_policy() {
        let config = LaneBlockerConfig {
            mitigation: MitigationPolicy::SpeedLimit { limit: 0.4 },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(LaneBlockerConfig::from_json_str(&json).unwrap(), config);
    }
}
