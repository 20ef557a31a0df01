//! Sampling resolution types.
//!
//! A `Resolution` is a concrete sampling configuration for the location
//! provider: how accurate fixes should be, how often they should arrive and
//! how far the asset must move before a new one is worth reporting.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Desired positional accuracy tier.
///
/// Variants are declared from coarsest to finest so the derived `Ord`
/// gives `Minimum < Low < Balanced < High < Maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Best effort with no additional power draw.
    Minimum,
    /// City level, circa 10km.
    Low,
    /// Block level, circa 100m.
    Balanced,
    /// Most accurate fixes the device offers.
    High,
    /// Navigation grade, with a significant power cost.
    Maximum,
}

impl Accuracy {
    /// Numeric level, 1 (minimum) to 5 (maximum).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Minimum => 1,
            Self::Low => 2,
            Self::Balanced => 3,
            Self::High => 4,
            Self::Maximum => 5,
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Minimum => "minimum",
            Self::Low => "low",
            Self::Balanced => "balanced",
            Self::High => "high",
            Self::Maximum => "maximum",
        };
        f.write_str(s)
    }
}

/// A validated sampling configuration.
///
/// Fields are private so every instance has passed validation: the
/// displacement is finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    accuracy: Accuracy,
    #[serde(rename = "desired_interval_ms", with = "duration_ms")]
    desired_interval: Duration,
    minimum_displacement: f64,
}

impl Resolution {
    /// Creates a resolution.
    ///
    /// # Errors
    /// Returns `ValidationError::NegativeOrNonFinite` if `minimum_displacement`
    /// is negative, NaN or infinite.
    pub fn new(
        accuracy: Accuracy,
        desired_interval: Duration,
        minimum_displacement: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            accuracy,
            desired_interval,
            minimum_displacement: non_negative("minimum_displacement", minimum_displacement)?,
        })
    }

    /// Convenience constructor taking the interval in milliseconds.
    ///
    /// # Errors
    /// Same as [`Resolution::new`].
    pub fn from_millis(
        accuracy: Accuracy,
        desired_interval_ms: u64,
        minimum_displacement: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            accuracy,
            Duration::from_millis(desired_interval_ms),
            minimum_displacement,
        )
    }

    /// Builds a resolution from constants already known to be valid.
    pub(crate) const fn from_valid_parts(
        accuracy: Accuracy,
        desired_interval: Duration,
        minimum_displacement: f64,
    ) -> Self {
        Self {
            accuracy,
            desired_interval,
            minimum_displacement,
        }
    }

    /// Accuracy tier.
    #[must_use]
    pub const fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    /// Desired time between fixes.
    #[must_use]
    pub const fn desired_interval(&self) -> Duration {
        self.desired_interval
    }

    /// Minimum movement, in metres, before a new fix is reported.
    #[must_use]
    pub const fn minimum_displacement(&self) -> f64 {
        self.minimum_displacement
    }

    /// Total "demand" order: the greater value is the more demanding one.
    ///
    /// Finer accuracy wins; on a tie the shorter interval wins; on a further
    /// tie the smaller displacement wins.
    #[must_use]
    pub fn cmp_demand(&self, other: &Self) -> Ordering {
        self.accuracy
            .cmp(&other.accuracy)
            .then_with(|| other.desired_interval.cmp(&self.desired_interval))
            .then_with(|| {
                other
                    .minimum_displacement
                    .total_cmp(&self.minimum_displacement)
            })
    }

    /// Returns true if `self` is strictly more demanding than `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.cmp_demand(other) == Ordering::Greater
    }

    /// Coarsens interval and displacement by `multiplier`.
    ///
    /// Saturates at `Duration::MAX` and `f64::MAX`.
    #[must_use]
    pub fn derated(&self, multiplier: f64) -> Self {
        let interval = Duration::try_from_secs_f64(self.desired_interval.as_secs_f64() * multiplier)
            .unwrap_or(Duration::MAX);
        let displacement = self.minimum_displacement * multiplier;
        Self {
            accuracy: self.accuracy,
            desired_interval: interval,
            minimum_displacement: if displacement.is_finite() {
                displacement
            } else {
                f64::MAX
            },
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}ms, {}m)",
            self.accuracy,
            self.desired_interval.as_millis(),
            self.minimum_displacement
        )
    }
}

#[derive(Deserialize)]
struct RawResolution {
    accuracy: Accuracy,
    desired_interval_ms: u64,
    minimum_displacement: f64,
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawResolution::deserialize(deserializer)?;
        Resolution::from_millis(raw.accuracy, raw.desired_interval_ms, raw.minimum_displacement)
            .map_err(serde::de::Error::custom)
    }
}

/// Validates a finite, non-negative quantity and normalises `-0.0` to `0.0`.
pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::NegativeOrNonFinite { field, value });
    }
    Ok(value + 0.0)
}

/// Serde adapter storing a `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// Same encoding for an optional duration.
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer
                    .serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(accuracy: Accuracy, ms: u64, m: f64) -> Resolution {
        Resolution::from_millis(accuracy, ms, m).unwrap()
    }

    #[test]
    fn accuracy_is_totally_ordered() {
        assert!(Accuracy::Minimum < Accuracy::Low);
        assert!(Accuracy::Low < Accuracy::Balanced);
        assert!(Accuracy::Balanced < Accuracy::High);
        assert!(Accuracy::High < Accuracy::Maximum);
        assert_eq!(Accuracy::Maximum.level(), 5);
    }

    #[test]
    fn rejects_negative_displacement() {
        let err = Resolution::from_millis(Accuracy::High, 1000, -1.0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NegativeOrNonFinite {
                field: "minimum_displacement",
                ..
            }
        ));
    }

    #[test]
    fn rejects_nan_displacement() {
        assert!(Resolution::from_millis(Accuracy::High, 1000, f64::NAN).is_err());
        assert!(Resolution::from_millis(Accuracy::High, 1000, f64::INFINITY).is_err());
    }

    #[test]
    fn negative_zero_is_normalised() {
        let a = r(Accuracy::Low, 10, -0.0);
        let b = r(Accuracy::Low, 10, 0.0);
        assert_eq!(a.cmp_demand(&b), Ordering::Equal);
    }

    #[test]
    fn finer_accuracy_dominates() {
        let fine = r(Accuracy::Maximum, 10_000, 100.0);
        let coarse = r(Accuracy::Low, 1, 1.0);
        assert!(fine.dominates(&coarse));
    }

    #[test]
    fn shorter_interval_breaks_accuracy_tie() {
        let a = r(Accuracy::High, 500, 50.0);
        let b = r(Accuracy::High, 1000, 1.0);
        assert!(a.dominates(&b));
    }

    #[test]
    fn smaller_displacement_breaks_interval_tie() {
        let a = r(Accuracy::High, 1000, 5.0);
        let b = r(Accuracy::High, 1000, 10.0);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn derating_multiplies_interval_and_displacement() {
        let base = r(Accuracy::High, 1000, 10.0);
        let derated = base.derated(3.0);
        assert_eq!(derated, r(Accuracy::High, 3000, 30.0));
    }

    #[test]
    fn derating_saturates() {
        let base = Resolution::new(Accuracy::Low, Duration::MAX, f64::MAX).unwrap();
        let derated = base.derated(10.0);
        assert_eq!(derated.desired_interval(), Duration::MAX);
        assert_eq!(derated.minimum_displacement(), f64::MAX);
    }

    #[test]
    fn serde_uses_milliseconds_and_validates() {
        let res = r(Accuracy::Balanced, 2500, 12.5);
        let json = serde_json::to_value(res).unwrap();
        assert_eq!(json["desired_interval_ms"], 2500);
        assert_eq!(json["accuracy"], "balanced");

        let back: Resolution = serde_json::from_value(json).unwrap();
        assert_eq!(back, res);

        let bad = serde_json::json!({
            "accuracy": "high",
            "desired_interval_ms": 10,
            "minimum_displacement": -3.0
        });
        assert!(serde_json::from_value::<Resolution>(bad).is_err());
    }
}
