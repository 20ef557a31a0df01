//! Trackables, coordinates and location fixes.
//!
//! A `Trackable` is the stable identity anchor for everything the engine
//! keeps per asset: its resolution requests, proximity monitor and last
//! published resolution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::ResolutionConstraints;
use crate::error::ValidationError;

const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Unique, non-empty trackable identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TrackableId(String);

impl TrackableId {
    /// Creates a trackable id.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyTrackableId` for an empty or
    /// whitespace-only id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyTrackableId);
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TrackableId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TrackableId::new(raw).map_err(serde::de::Error::custom)
    }
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidCoordinate` if latitude is outside
    /// [-90, 90], longitude outside [-180, 180], or either is not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(ValidationError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in metres (haversine).
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_METERS * c
    }
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawCoordinate::deserialize(deserializer)?;
        Coordinate::new(raw.latitude, raw.longitude).map_err(serde::de::Error::custom)
    }
}

/// Target the asset is heading to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Target position.
    pub coordinate: Coordinate,
    /// Estimated arrival time, used by temporal proximity thresholds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
}

impl Destination {
    /// A destination without an arrival estimate.
    #[must_use]
    pub const fn at(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            estimated_arrival: None,
        }
    }

    /// Attaches an arrival estimate.
    #[must_use]
    pub const fn with_estimated_arrival(mut self, eta: DateTime<Utc>) -> Self {
        self.estimated_arrival = Some(eta);
        self
    }
}

/// A raw position fix from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Reported position.
    pub coordinate: Coordinate,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Creates a fix.
    #[must_use]
    pub const fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            timestamp,
        }
    }
}

/// A tracked moving asset.
///
/// Identity and constraints are fixed at creation; the destination may be
/// changed through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trackable {
    /// Stable identifier.
    pub id: TrackableId,
    /// Opaque application metadata.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Optional target position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    /// Optional resolution constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ResolutionConstraints>,
}

impl Trackable {
    /// Creates a trackable with no metadata, destination or constraints.
    #[must_use]
    pub fn new(id: TrackableId) -> Self {
        Self {
            id,
            metadata: serde_json::Value::Null,
            destination: None,
            constraints: None,
        }
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the initial destination.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Sets the constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: ResolutionConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id() {
        assert_eq!(TrackableId::new("  "), Err(ValidationError::EmptyTrackableId));
        assert!(serde_json::from_str::<TrackableId>("\"\"").is_err());
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn distance_of_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0).unwrap();
        let b = Coordinate::new(1.0, 0.0).unwrap();
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
        assert!((b.distance_to(&a) - d).abs() < 1e-6);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn trackable_roundtrips_through_json() {
        let t = Trackable::new(TrackableId::new("parcel-1").unwrap())
            .with_metadata(serde_json::json!({"kind": "parcel"}))
            .with_destination(Destination::at(Coordinate::new(51.5, -0.12).unwrap()));
        let json = serde_json::to_string(&t).unwrap();
        let back: Trackable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
