//! Location throttling against the effective resolution.
//!
//! A fix is forwarded to subscribers only when it is both far enough and
//! late enough relative to the last forwarded fix. Skipped fixes are kept
//! (bounded) and handed back with the next forwarded one.

use serde::{Deserialize, Serialize};

use crate::resolution::Resolution;
use crate::trackable::LocationFix;

/// Maximum number of skipped fixes retained per trackable.
pub const MAX_SKIPPED_LOCATIONS: usize = 60;

/// Outcome of offering a fix to the throttle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationDecision {
    /// Forward `fix`, preceded by the fixes skipped since the last forward.
    Publish {
        fix: LocationFix,
        skipped: Vec<LocationFix>,
    },
    /// Hold the fix back.
    Skip,
}

impl LocationDecision {
    /// Returns true for `Publish`.
    #[must_use]
    pub const fn is_publish(&self) -> bool {
        matches!(self, Self::Publish { .. })
    }
}

/// Per-trackable throttle state.
#[derive(Debug, Clone, Default)]
pub struct LocationThrottle {
    last_sent: Option<LocationFix>,
    skipped: Vec<LocationFix>,
}

impl LocationThrottle {
    /// Empty throttle; the first fix is always forwarded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether `fix` should be forwarded under `resolution`.
    ///
    /// With no resolution yet, every fix is forwarded.
    pub fn offer(&mut self, fix: LocationFix, resolution: Option<&Resolution>) -> LocationDecision {
        if !should_send(&fix, self.last_sent.as_ref(), resolution) {
            self.push_skipped(fix);
            return LocationDecision::Skip;
        }
        self.last_sent = Some(fix);
        LocationDecision::Publish {
            fix,
            skipped: std::mem::take(&mut self.skipped),
        }
    }

    /// Number of fixes currently held back.
    #[must_use]
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    fn push_skipped(&mut self, fix: LocationFix) {
        self.skipped.push(fix);
        self.skipped.sort_by_key(|f| f.timestamp);
        if self.skipped.len() > MAX_SKIPPED_LOCATIONS {
            self.skipped.remove(0);
        }
    }
}

fn should_send(
    fix: &LocationFix,
    last_sent: Option<&LocationFix>,
    resolution: Option<&Resolution>,
) -> bool {
    let (Some(last), Some(resolution)) = (last_sent, resolution) else {
        return true;
    };
    // Fixes older than the last forwarded one never count as elapsed.
    let Ok(elapsed) = fix.timestamp.signed_duration_since(last.timestamp).to_std() else {
        return false;
    };
    let moved = fix.coordinate.distance_to(&last.coordinate);
    moved >= resolution.minimum_displacement() && elapsed >= resolution.desired_interval()
}
