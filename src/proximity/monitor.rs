use serde::{Deserialize, Serialize};

use crate::constraints::Proximity;
use crate::trackable::{Destination, LocationFix};

use super::threshold::{is_threshold_reached, ProximityMode};

/// Monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityState {
    /// No destination or no threshold configured.
    Idle,
    /// Armed, condition not yet met.
    Waiting,
    /// Condition met since the monitor was last armed.
    Reached,
}

/// Edge produced by the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProximityTransition {
    /// `Waiting -> Reached`.
    Reached(Proximity),
    /// `Reached -> Idle`, or `Reached -> Waiting` when the destination changed.
    Cancelled,
}

/// Edge-triggered detector of "near the destination" for one trackable.
///
/// `Reached` is latched: once entered it is only left by clearing or
/// replacing the destination, or by [`ProximityMonitor::cancel`].
#[derive(Debug, Clone)]
pub struct ProximityMonitor {
    threshold: Option<Proximity>,
    destination: Option<Destination>,
    mode: ProximityMode,
    state: ProximityState,
}

impl ProximityMonitor {
    /// Creates a monitor, armed if both a threshold and a destination exist.
    #[must_use]
    pub fn new(
        threshold: Option<Proximity>,
        destination: Option<Destination>,
        mode: ProximityMode,
    ) -> Self {
        let mut monitor = Self {
            threshold,
            destination,
            mode,
            state: ProximityState::Idle,
        };
        monitor.state = monitor.armed_state();
        monitor
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ProximityState {
        self.state
    }

    /// Returns true while in `Reached`.
    #[must_use]
    pub fn is_reached(&self) -> bool {
        self.state == ProximityState::Reached
    }

    /// Current destination.
    #[must_use]
    pub const fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    /// Replaces or clears the destination.
    ///
    /// Leaving `Reached` reports `Cancelled` exactly once. Re-sending the
    /// current destination is a no-op.
    pub fn set_destination(
        &mut self,
        destination: Option<Destination>,
    ) -> Option<ProximityTransition> {
        if destination == self.destination {
            return None;
        }
        let was_reached = self.is_reached();
        self.destination = destination;
        self.state = self.armed_state();
        was_reached.then_some(ProximityTransition::Cancelled)
    }

    /// Evaluates a fix while `Waiting`.
    ///
    /// Reports `Reached` only on the `Waiting -> Reached` edge.
    pub fn observe(&mut self, fix: &LocationFix) -> Option<ProximityTransition> {
        if self.state != ProximityState::Waiting {
            return None;
        }
        let (Some(threshold), Some(destination)) = (self.threshold, self.destination.as_ref())
        else {
            return None;
        };
        if is_threshold_reached(&threshold, self.mode, fix, destination) {
            self.state = ProximityState::Reached;
            return Some(ProximityTransition::Reached(threshold));
        }
        None
    }

    /// Disarms the monitor, e.g. when its trackable is removed.
    pub fn cancel(&mut self) -> Option<ProximityTransition> {
        let was_reached = self.is_reached();
        self.threshold = None;
        self.destination = None;
        self.state = ProximityState::Idle;
        was_reached.then_some(ProximityTransition::Cancelled)
    }

    fn armed_state(&self) -> ProximityState {
        if self.threshold.is_some() && self.destination.is_some() {
            ProximityState::Waiting
        } else {
            ProximityState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::trackable::Coordinate;

    fn fix_at(lat: f64) -> LocationFix {
        LocationFix::new(Coordinate::new(lat, 0.0).unwrap(), Utc::now())
    }

    fn origin() -> Destination {
        Destination::at(Coordinate::new(0.0, 0.0).unwrap())
    }

    fn armed() -> ProximityMonitor {
        ProximityMonitor::new(
            Some(Proximity::spatial(50.0).unwrap()),
            Some(origin()),
            ProximityMode::All,
        )
    }

    fn without_destination() -> ProximityMonitor {
        ProximityMonitor::new(Some(Proximity::spatial(50.0).unwrap()), None, ProximityMode::All)
    }

    #[test]
    fn idle_without_destination() {
        let mut m = without_destination();
        assert_eq!(m.state(), ProximityState::Idle);
        assert_eq!(m.observe(&fix_at(0.0)), None);
        assert_eq!(m.state(), ProximityState::Idle);
    }

    #[test]
    fn idle_without_threshold() {
        let mut m = ProximityMonitor::new(None, Some(origin()), ProximityMode::All);
        assert_eq!(m.state(), ProximityState::Idle);
        assert_eq!(m.observe(&fix_at(0.0)), None);
    }

    #[test]
    fn reached_fires_once() {
        let mut m = armed();
        assert_eq!(m.state(), ProximityState::Waiting);
        assert_eq!(m.observe(&fix_at(0.009)), None);

        let t = m.observe(&fix_at(0.00027));
        assert!(matches!(t, Some(ProximityTransition::Reached(_))));
        assert_eq!(m.state(), ProximityState::Reached);

        assert_eq!(m.observe(&fix_at(0.0001)), None);
        assert_eq!(m.observe(&fix_at(0.0)), None);
        // Moving away keeps the latch.
        assert_eq!(m.observe(&fix_at(0.009)), None);
        assert!(m.is_reached());
    }

    #[test]
    fn clearing_destination_cancels_once() {
        let mut m = armed();
        m.observe(&fix_at(0.0));
        assert_eq!(m.set_destination(None), Some(ProximityTransition::Cancelled));
        assert_eq!(m.state(), ProximityState::Idle);
        assert_eq!(m.set_destination(None), None);
    }

    #[test]
    fn clearing_while_waiting_is_silent() {
        let mut m = armed();
        assert_eq!(m.set_destination(None), None);
        assert_eq!(m.state(), ProximityState::Idle);
    }

    #[test]
    fn new_destination_rearms() {
        let mut m = armed();
        m.observe(&fix_at(0.0));
        let elsewhere = Destination::at(Coordinate::new(10.0, 10.0).unwrap());
        assert_eq!(m.set_destination(Some(elsewhere)), Some(ProximityTransition::Cancelled));
        assert_eq!(m.state(), ProximityState::Waiting);
        assert_eq!(m.observe(&fix_at(0.0)), None);
    }

    #[test]
    fn same_destination_keeps_the_latch() {
        let mut m = armed();
        m.observe(&fix_at(0.00027));
        assert_eq!(m.set_destination(Some(origin())), None);
        assert_eq!(m.state(), ProximityState::Reached);
        assert_eq!(m.observe(&fix_at(0.0)), None);

        let mut m = armed();
        assert_eq!(m.set_destination(Some(origin())), None);
        assert_eq!(m.state(), ProximityState::Waiting);
    }

    #[test]
    fn idle_to_waiting_when_destination_arrives() {
        let mut m = without_destination();
        assert_eq!(m.set_destination(Some(origin())), None);
        assert_eq!(m.state(), ProximityState::Waiting);
    }

    #[test]
    fn cancel_reports_only_from_reached() {
        let mut m = armed();
        assert_eq!(m.cancel(), None);

        let mut m = armed();
        m.observe(&fix_at(0.0));
        assert_eq!(m.cancel(), Some(ProximityTransition::Cancelled));
        assert_eq!(m.cancel(), None);
    }
}
