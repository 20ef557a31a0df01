//! Event types published to listeners.
//!
//! These types are serializable so an application layer can forward them
//! over whatever transport it uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraints::Proximity;
use crate::resolution::Resolution;
use crate::trackable::TrackableId;

/// Unique identifier for a listener subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A newly committed effective resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionUpdate {
    /// Trackable the resolution applies to.
    pub trackable: TrackableId,
    /// The effective resolution.
    pub resolution: Resolution,
}

/// Event payloads.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Tracking started.
    TrackableAdded { trackable: TrackableId },

    /// Tracking stopped; all derived state is gone.
    TrackableRemoved { trackable: TrackableId },

    /// The proximity monitor entered `Reached`.
    ProximityReached {
        trackable: TrackableId,
        threshold: Proximity,
    },

    /// The proximity monitor left `Reached`.
    ProximityCancelled { trackable: TrackableId },

    /// The resolution policy failed; the previous resolution was kept.
    PolicyFailed {
        trackable: TrackableId,
        policy: String,
        reason: String,
    },
}

impl EventPayload {
    /// Trackable the event concerns.
    #[must_use]
    pub const fn trackable(&self) -> &TrackableId {
        match self {
            Self::TrackableAdded { trackable }
            | Self::TrackableRemoved { trackable }
            | Self::ProximityReached { trackable, .. }
            | Self::ProximityCancelled { trackable }
            | Self::PolicyFailed { trackable, .. } => trackable,
        }
    }
}

/// A published event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EngineEvent {
    /// Wraps a payload with a fresh id and the current time.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = EventPayload::ProximityCancelled {
            trackable: TrackableId::new("t1").unwrap(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "proximity_cancelled");
        assert_eq!(json["trackable"], "t1");
        assert_eq!(payload.trackable().as_str(), "t1");
    }

    #[test]
    fn events_get_unique_ids() {
        let t = TrackableId::new("t1").unwrap();
        let a = EngineEvent::new(EventPayload::TrackableAdded { trackable: t.clone() });
        let b = EngineEvent::new(EventPayload::TrackableAdded { trackable: t });
        assert_ne!(a.event_id, b.event_id);
    }
}
