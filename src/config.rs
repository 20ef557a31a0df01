//! Engine configuration.
//!
//! Built once, validated once. Every field has a default so a partial JSON
//! document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::proximity::ProximityMode;
use crate::resolution::{Accuracy, Resolution};

/// Configuration for [`ResolutionEngine`](crate::ResolutionEngine) and
/// [`TrackingRuntime`](crate::TrackingRuntime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolution used when a trackable has no demands at all.
    pub default_resolution: Resolution,
    /// How composite proximity thresholds are combined.
    pub proximity_mode: ProximityMode,
    /// Per-subscription event queue capacity.
    pub event_stream_capacity: usize,
    /// Max queued inputs in the runtime before `try_submit` reports full.
    pub input_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_resolution: default_resolution(),
            proximity_mode: ProximityMode::All,
            event_stream_capacity: 1024,
            input_queue_capacity: 4096,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    /// `InvalidConfig` for malformed JSON or out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks capacities.
    ///
    /// # Errors
    /// `InvalidConfig` if a capacity is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_stream_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "event_stream_capacity must be at least 1".to_string(),
            });
        }
        if self.input_queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "input_queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

const fn default_resolution() -> Resolution {
    Resolution::from_valid_parts(Accuracy::Balanced, Duration::from_secs(5), 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proximity_mode, ProximityMode::All);
        assert_eq!(config.default_resolution.accuracy(), Accuracy::Balanced);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "proximity_mode": "any" }"#).unwrap();
        assert_eq!(config.proximity_mode, ProximityMode::Any);
        assert_eq!(config.event_stream_capacity, 1024);
    }

    #[test]
    fn json_with_resolution() {
        let config = EngineConfig::from_json_str(
            r#"{ "default_resolution": { "accuracy": "low", "desired_interval_ms": 30000, "minimum_displacement": 250.0 } }"#,
        )
        .unwrap();
        assert_eq!(
            config.default_resolution,
            Resolution::from_millis(Accuracy::Low, 30_000, 250.0).unwrap()
        );
    }

    #[test]
    fn rejects_zero_capacity_and_bad_json() {
        assert!(EngineConfig::from_json_str(r#"{ "input_queue_capacity": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
        let err = EngineConfig::from_json_str(
            r#"{ "default_resolution": { "accuracy": "low", "desired_interval_ms": 1, "minimum_displacement": -1.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }
}
