//! Proximity-to-destination detection.
//!
//! Each trackable owns one edge-triggered `ProximityMonitor`. The monitor
//! reports a transition only when its state actually changes, so repeated
//! fixes inside the threshold never produce duplicate events.

/// Threshold evaluation against a single fix.
pub mod threshold;
/// Per-trackable state machine.
pub mod monitor;

pub use monitor::{ProximityMonitor, ProximityState, ProximityTransition};
pub use threshold::{is_threshold_reached, ProximityMode};
