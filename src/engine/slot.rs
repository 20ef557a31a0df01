//! Per-trackable serialization domain.

use std::sync::{Mutex, MutexGuard};

use crate::error::{lock_err, TrackingResult};
use crate::proximity::{ProximityMode, ProximityMonitor, ProximityTransition};
use crate::registry::TrackableRequests;
use crate::resolution::Resolution;
use crate::throttle::LocationThrottle;
use crate::trackable::Trackable;

/// Authoritative state for one trackable.
///
/// Only ever touched while the owning [`TrackableSlot`] is locked.
#[derive(Debug)]
pub(crate) struct TrackableState {
    pub(crate) trackable: Trackable,
    pub(crate) requests: TrackableRequests,
    pub(crate) monitor: ProximityMonitor,
    pub(crate) throttle: LocationThrottle,
    pub(crate) last_published: Option<Resolution>,
    pub(crate) removed: bool,
}

impl TrackableState {
    pub(crate) fn new(trackable: Trackable, mode: ProximityMode) -> Self {
        let threshold = trackable
            .constraints
            .as_ref()
            .map(|c| *c.proximity_threshold());
        let monitor = ProximityMonitor::new(threshold, trackable.destination, mode);
        Self {
            requests: TrackableRequests::new(trackable.id.clone()),
            trackable,
            monitor,
            throttle: LocationThrottle::new(),
            last_published: None,
            removed: false,
        }
    }

    /// Records `resolution` as published.
    ///
    /// Returns false, leaving state untouched, if the trackable was removed
    /// or the value equals the last published one.
    pub(crate) fn commit(&mut self, resolution: Resolution) -> bool {
        if self.removed || self.last_published == Some(resolution) {
            return false;
        }
        self.last_published = Some(resolution);
        true
    }

    /// Clears every piece of derived state and marks the slot dead.
    pub(crate) fn tear_down(&mut self) -> Option<ProximityTransition> {
        self.removed = true;
        self.requests.clear();
        self.throttle = LocationThrottle::new();
        self.last_published = None;
        self.monitor.cancel()
    }
}

/// Mutex-guarded [`TrackableState`].
#[derive(Debug)]
pub(crate) struct TrackableSlot {
    state: Mutex<TrackableState>,
}

impl TrackableSlot {
    pub(crate) fn new(state: TrackableState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn lock(&self) -> TrackingResult<MutexGuard<'_, TrackableState>> {
        self.state.lock().map_err(|_| lock_err("trackable slot"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::Accuracy;
    use crate::trackable::TrackableId;

    fn state() -> TrackableState {
        TrackableState::new(
            Trackable::new(TrackableId::new("t").unwrap()),
            ProximityMode::All,
        )
    }

    #[test]
    fn commit_deduplicates_by_value() {
        let mut s = state();
        let r = Resolution::from_millis(Accuracy::High, 1000, 1.0).unwrap();
        assert!(s.commit(r));
        assert!(!s.commit(r));
        assert_eq!(s.last_published, Some(r));
    }

    #[test]
    fn removed_slot_discards_commit() {
        let mut s = state();
        let r = Resolution::from_millis(Accuracy::High, 1000, 1.0).unwrap();
        assert!(s.commit(r));
        assert!(s.tear_down().is_none());

        let other = Resolution::from_millis(Accuracy::Low, 5000, 1.0).unwrap();
        assert!(!s.commit(other));
        assert_eq!(s.last_published, None);
    }
}
