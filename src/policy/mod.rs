//! Resolution policy engine.
//!
//! Merges competing resolution demands into one effective resolution per
//! trackable. The merge functions are pure and synchronous so the engine can
//! run them inline while holding a trackable's slot.

mod policies;
mod resolver;

pub use policies::{
    DefaultResolutionPolicy, ResolutionPolicy, ResolutionState, TrackableResolutionRequest,
};
pub use resolver::{derate_baseline, resolve_dominant, resolve_trackable, select_baseline};
