//! # asset-resolution
//!
//! Adaptive sampling resolution for asset tracking. A publisher reports the
//! position of moving trackables to any number of subscribers, each of which
//! may ask for a different sampling resolution. This crate combines those
//! demands with per-trackable proximity to a destination and the publisher's
//! battery level into one effective [`Resolution`] per trackable, and keeps
//! it current as inputs change.
//!
//! ## Core Concepts
//!
//! - **Resolution**: accuracy tier, desired interval and minimum displacement
//! - **ResolutionConstraints**: four resolutions keyed by proximity and
//!   subscriber presence, plus a proximity threshold and battery derating
//! - **Proximity monitor**: edge-triggered "near the destination" detector
//! - **Policy**: pluggable dominant-wins merge of all demands
//! - **Engine**: per-trackable state owner that serializes inputs and
//!   publishes de-duplicated results to conflating listeners
//!
//! ## Usage
//!
//! ```rust,ignore
//! use asset_resolution::{
//!     Accuracy, Coordinate, Destination, EngineConfig, Proximity, Resolution,
//!     ResolutionConstraints, ResolutionEngine, ResolutionSet, Trackable, TrackableId,
//! };
//!
//! let engine = ResolutionEngine::with_default_policy(EngineConfig::default())?;
//! let constraints = ResolutionConstraints::new(
//!     ResolutionSet::far_near(
//!         Resolution::from_millis(Accuracy::Low, 10_000, 100.0)?,
//!         Resolution::from_millis(Accuracy::High, 1_000, 10.0)?,
//!     ),
//!     Proximity::spatial(50.0)?,
//!     20.0,
//!     3.0,
//! )?;
//! let trackable = Trackable::new(TrackableId::new("parcel-1")?)
//!     .with_destination(Destination::at(Coordinate::new(51.5, -0.12)?))
//!     .with_constraints(constraints);
//! engine.add_trackable(trackable)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constraints;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod policy;
pub mod proximity;
pub mod registry;
pub mod resolution;
pub mod throttle;
pub mod trackable;

// Re-export primary types at crate root for convenience
pub use config::EngineConfig;
pub use constraints::{Proximity, ResolutionConstraints, ResolutionSet};
pub use dispatch::{
    EngineEvent, EventPayload, EventStream, ResolutionStream, ResolutionUpdate, SubscriptionId,
};
pub use engine::runtime::{EngineInput, LocationSink, ResolutionSink, TrackingRuntime};
pub use engine::ResolutionEngine;
pub use error::{
    ExecutionError, PolicyError, TrackingError, TrackingResult, ValidationError,
};
pub use policy::{
    DefaultResolutionPolicy, ResolutionPolicy, ResolutionState, TrackableResolutionRequest,
};
pub use proximity::{ProximityMode, ProximityMonitor, ProximityState, ProximityTransition};
pub use registry::{RequestKey, RequestOrigin, ResolutionRequest, SubscriberId, TrackableRequests};
pub use resolution::{Accuracy, Resolution};
pub use throttle::{LocationDecision, LocationThrottle, MAX_SKIPPED_LOCATIONS};
pub use trackable::{Coordinate, Destination, LocationFix, Trackable, TrackableId};
