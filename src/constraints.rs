//! Per-trackable resolution constraints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::resolution::{duration_ms, non_negative, Resolution};

/// Exactly four resolutions keyed by (proximity reached, subscriber present).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSet {
    /// Far from the destination, nobody watching.
    pub far_without_subscriber: Resolution,
    /// Far from the destination, at least one subscriber.
    pub far_with_subscriber: Resolution,
    /// Near the destination, nobody watching.
    pub near_without_subscriber: Resolution,
    /// Near the destination, at least one subscriber.
    pub near_with_subscriber: Resolution,
}

impl ResolutionSet {
    /// Builds a set from all four entries.
    #[must_use]
    pub const fn new(
        far_without_subscriber: Resolution,
        far_with_subscriber: Resolution,
        near_without_subscriber: Resolution,
        near_with_subscriber: Resolution,
    ) -> Self {
        Self {
            far_without_subscriber,
            far_with_subscriber,
            near_without_subscriber,
            near_with_subscriber,
        }
    }

    /// Uses one resolution for every state.
    #[must_use]
    pub const fn uniform(resolution: Resolution) -> Self {
        Self::new(resolution, resolution, resolution, resolution)
    }

    /// One resolution when far, another when near, regardless of subscribers.
    #[must_use]
    pub const fn far_near(far: Resolution, near: Resolution) -> Self {
        Self::new(far, far, near, near)
    }

    /// Table lookup.
    #[must_use]
    pub const fn select(&self, proximity_reached: bool, subscriber_present: bool) -> Resolution {
        match (proximity_reached, subscriber_present) {
            (false, false) => self.far_without_subscriber,
            (false, true) => self.far_with_subscriber,
            (true, false) => self.near_without_subscriber,
            (true, true) => self.near_with_subscriber,
        }
    }
}

/// "Near the destination" condition.
///
/// At least one of the two fields is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Proximity {
    #[serde(skip_serializing_if = "Option::is_none")]
    spatial: Option<f64>,
    #[serde(
        rename = "temporal_ms",
        with = "duration_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    temporal: Option<Duration>,
}

impl Proximity {
    /// Creates a proximity threshold.
    ///
    /// # Errors
    /// Rejects a negative or non-finite spatial distance, and a threshold
    /// with neither field set.
    pub fn new(spatial: Option<f64>, temporal: Option<Duration>) -> Result<Self, ValidationError> {
        if spatial.is_none() && temporal.is_none() {
            return Err(ValidationError::EmptyProximity);
        }
        let spatial = spatial
            .map(|m| non_negative("proximity.spatial", m))
            .transpose()?;
        Ok(Self { spatial, temporal })
    }

    /// Spatial-only threshold, in metres.
    ///
    /// # Errors
    /// Rejects a negative or non-finite distance.
    pub fn spatial(meters: f64) -> Result<Self, ValidationError> {
        Self::new(Some(meters), None)
    }

    /// Temporal-only threshold.
    #[must_use]
    pub const fn temporal(before_arrival: Duration) -> Self {
        Self {
            spatial: None,
            temporal: Some(before_arrival),
        }
    }

    /// Distance from the destination below which proximity holds.
    #[must_use]
    pub const fn spatial_threshold(&self) -> Option<f64> {
        self.spatial
    }

    /// Time before the estimated arrival below which proximity holds.
    #[must_use]
    pub const fn temporal_threshold(&self) -> Option<Duration> {
        self.temporal
    }
}

#[derive(Deserialize)]
struct RawProximity {
    #[serde(default)]
    spatial: Option<f64>,
    #[serde(default)]
    temporal_ms: Option<u64>,
}

impl<'de> Deserialize<'de> for Proximity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawProximity::deserialize(deserializer)?;
        Proximity::new(raw.spatial, raw.temporal_ms.map(Duration::from_millis))
            .map_err(serde::de::Error::custom)
    }
}

/// Constraints attached to a trackable at creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolutionConstraints {
    resolutions: ResolutionSet,
    proximity_threshold: Proximity,
    battery_level_threshold: f32,
    low_battery_multiplier: f64,
}

impl ResolutionConstraints {
    /// Creates validated constraints.
    ///
    /// # Errors
    /// Rejects a battery threshold outside [0, 100] and a multiplier that is
    /// not finite or below 1.
    pub fn new(
        resolutions: ResolutionSet,
        proximity_threshold: Proximity,
        battery_level_threshold: f32,
        low_battery_multiplier: f64,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=100.0).contains(&battery_level_threshold) {
            return Err(ValidationError::BatteryThresholdOutOfRange {
                value: battery_level_threshold,
            });
        }
        if !low_battery_multiplier.is_finite() || low_battery_multiplier < 1.0 {
            return Err(ValidationError::InvalidLowBatteryMultiplier {
                value: low_battery_multiplier,
            });
        }
        Ok(Self {
            resolutions,
            proximity_threshold,
            battery_level_threshold,
            low_battery_multiplier,
        })
    }

    /// The four-entry resolution table.
    #[must_use]
    pub const fn resolutions(&self) -> &ResolutionSet {
        &self.resolutions
    }

    /// Proximity condition for switching to the "near" entries.
    #[must_use]
    pub const fn proximity_threshold(&self) -> &Proximity {
        &self.proximity_threshold
    }

    /// Battery percentage below which the baseline is derated.
    #[must_use]
    pub const fn battery_level_threshold(&self) -> f32 {
        self.battery_level_threshold
    }

    /// Factor applied to interval and displacement on low battery.
    #[must_use]
    pub const fn low_battery_multiplier(&self) -> f64 {
        self.low_battery_multiplier
    }

    /// Returns true if `battery_level` is known and below the threshold.
    #[must_use]
    pub fn is_low_battery(&self, battery_level: Option<f32>) -> bool {
        battery_level.is_some_and(|level| level < self.battery_level_threshold)
    }
}

#[derive(Deserialize)]
struct RawConstraints {
    resolutions: ResolutionSet,
    proximity_threshold: Proximity,
    battery_level_threshold: f32,
    low_battery_multiplier: f64,
}

impl<'de> Deserialize<'de> for ResolutionConstraints {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawConstraints::deserialize(deserializer)?;
        ResolutionConstraints::new(
            raw.resolutions,
            raw.proximity_threshold,
            raw.battery_level_threshold,
            raw.low_battery_multiplier,
        )
        .map_err(serde::de::Error::custom)
    }
}
