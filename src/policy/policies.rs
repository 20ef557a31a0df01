use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::policy::resolver::{resolve_dominant, resolve_trackable};
use crate::resolution::Resolution;
use crate::trackable::Trackable;

/// Inputs besides the demand set that shape a trackable's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolutionState {
    /// The trackable's proximity monitor is in `Reached`.
    pub proximity_reached: bool,
    /// At least one subscriber is present for the trackable.
    pub subscriber_present: bool,
    /// Publisher battery percentage, if known.
    pub battery_level: Option<f32>,
}

/// Everything a policy needs to resolve one trackable.
#[derive(Debug, Clone, Copy)]
pub struct TrackableResolutionRequest<'a> {
    /// The trackable, with its constraints.
    pub trackable: &'a Trackable,
    /// The LOCAL-origin request, if any.
    pub local: Option<Resolution>,
    /// Subscriber-requested resolutions.
    pub remote: &'a [Resolution],
    /// Proximity, presence and battery state.
    pub state: ResolutionState,
}

/// Pluggable resolution strategy.
///
/// Supplied once when the engine is built and invoked synchronously from
/// the owning trackable's slot. Implementations must be pure: no I/O, no
/// blocking. Errors and panics are contained by the engine.
pub trait ResolutionPolicy: Send + Sync {
    /// Short stable identifier for logs.
    fn name(&self) -> &str {
        "custom"
    }

    /// Merges a bare set of demands into one resolution.
    ///
    /// # Errors
    /// Implementation-defined.
    fn resolve_set(&self, demands: &[Resolution]) -> Result<Resolution, PolicyError>;

    /// Resolves the effective resolution for one trackable.
    ///
    /// # Errors
    /// Implementation-defined.
    fn resolve(&self, request: &TrackableResolutionRequest<'_>) -> Result<Resolution, PolicyError>;
}

/// Dominant-wins policy with proximity/presence selection and battery derating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultResolutionPolicy {
    default_resolution: Resolution,
}

impl DefaultResolutionPolicy {
    /// Creates the policy; `default_resolution` answers empty demand sets.
    #[must_use]
    pub const fn new(default_resolution: Resolution) -> Self {
        Self { default_resolution }
    }

    /// Resolution returned for an empty demand set.
    #[must_use]
    pub const fn default_resolution(&self) -> Resolution {
        self.default_resolution
    }
}

impl ResolutionPolicy for DefaultResolutionPolicy {
    fn name(&self) -> &str {
        "default"
    }

    fn resolve_set(&self, demands: &[Resolution]) -> Result<Resolution, PolicyError> {
        Ok(resolve_dominant(demands).unwrap_or(self.default_resolution))
    }

    fn resolve(&self, request: &TrackableResolutionRequest<'_>) -> Result<Resolution, PolicyError> {
        Ok(resolve_trackable(request, self.default_resolution))
    }
}
