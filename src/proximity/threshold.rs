use serde::{Deserialize, Serialize};

use crate::constraints::Proximity;
use crate::trackable::{Destination, LocationFix};

/// How a threshold with both a spatial and a temporal field is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityMode {
    /// Every configured field must hold.
    #[default]
    All,
    /// Any configured field suffices.
    Any,
}

/// Evaluates `threshold` for `fix` against `destination`.
///
/// - Spatial: the distance to the destination is strictly below the threshold.
/// - Temporal: the time left until the estimated arrival, measured from the
///   fix timestamp, is strictly below the threshold. Without an estimate the
///   temporal condition does not hold.
#[must_use]
pub fn is_threshold_reached(
    threshold: &Proximity,
    mode: ProximityMode,
    fix: &LocationFix,
    destination: &Destination,
) -> bool {
    let spatial = threshold
        .spatial_threshold()
        .map(|meters| fix.coordinate.distance_to(&destination.coordinate) < meters);

    let temporal = threshold.temporal_threshold().map(|before| {
        let Some(eta) = destination.estimated_arrival else {
            return false;
        };
        let remaining = eta - fix.timestamp;
        match chrono::Duration::from_std(before) {
            Ok(before) => remaining < before,
            // Threshold larger than any representable span.
            Err(_) => true,
        }
    });

    match (spatial, temporal, mode) {
        (Some(s), Some(t), ProximityMode::All) => s && t,
        (Some(s), Some(t), ProximityMode::Any) => s || t,
        (Some(s), None, _) => s,
        (None, Some(t), _) => t,
        (None, None, _) => false,
    }
}
