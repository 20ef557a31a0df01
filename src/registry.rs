//! Resolution request registry.
//!
//! Holds, for one trackable, the outstanding resolution demands keyed by
//! origin: at most one LOCAL request (the publisher's own default) and at
//! most one request per subscriber. Subscriber presence is tracked
//! separately because a subscriber can be present without asking for a
//! specific resolution.
//!
//! The registry is not synchronised; the engine owns one per trackable
//! inside that trackable's serialisation slot.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resolution::Resolution;
use crate::trackable::TrackableId;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Create a new random subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resolution demand came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
    /// The publisher itself.
    Local,
    /// A remote subscriber.
    Subscriber,
}

/// Registry key: origin plus subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKey {
    /// The single LOCAL slot.
    Local,
    /// One slot per subscriber.
    Subscriber(SubscriberId),
}

impl RequestKey {
    /// Origin of requests stored under this key.
    #[must_use]
    pub const fn origin(&self) -> RequestOrigin {
        match self {
            Self::Local => RequestOrigin::Local,
            Self::Subscriber(_) => RequestOrigin::Subscriber,
        }
    }
}

/// A single resolution demand. Equality is by value of all fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Requested resolution.
    pub resolution: Resolution,
    /// Trackable the request applies to.
    pub trackable: TrackableId,
    /// Who asked.
    pub origin: RequestOrigin,
}

/// Outstanding demands and subscriber presence for one trackable.
#[derive(Debug, Clone)]
pub struct TrackableRequests {
    trackable: TrackableId,
    entries: HashMap<RequestKey, ResolutionRequest>,
    present: HashSet<SubscriberId>,
}

impl TrackableRequests {
    /// Empty registry for `trackable`.
    #[must_use]
    pub fn new(trackable: TrackableId) -> Self {
        Self {
            trackable,
            entries: HashMap::new(),
            present: HashSet::new(),
        }
    }

    /// Adds or replaces the request under `key`, or removes it for `None`.
    ///
    /// Returns true if the stored demand changed.
    pub fn set(&mut self, key: RequestKey, resolution: Option<Resolution>) -> bool {
        let Some(resolution) = resolution else {
            return self.entries.remove(&key).is_some();
        };
        let request = ResolutionRequest {
            resolution,
            trackable: self.trackable.clone(),
            origin: key.origin(),
        };
        self.entries.insert(key, request.clone()) != Some(request)
    }

    /// Marks a subscriber present. Returns true if it was not already.
    pub fn add_subscriber(&mut self, subscriber: SubscriberId) -> bool {
        self.present.insert(subscriber)
    }

    /// Removes a subscriber together with its request.
    ///
    /// Returns true if anything changed.
    pub fn remove_subscriber(&mut self, subscriber: SubscriberId) -> bool {
        let was_present = self.present.remove(&subscriber);
        let had_request = self.entries.remove(&RequestKey::Subscriber(subscriber)).is_some();
        was_present || had_request
    }

    /// Returns true if `subscriber` is present.
    #[must_use]
    pub fn is_present(&self, subscriber: SubscriberId) -> bool {
        self.present.contains(&subscriber)
    }

    /// Returns true if at least one subscriber is present.
    #[must_use]
    pub fn subscriber_present(&self) -> bool {
        !self.present.is_empty()
    }

    /// The LOCAL request's resolution, if any.
    #[must_use]
    pub fn local(&self) -> Option<Resolution> {
        self.entries.get(&RequestKey::Local).map(|r| r.resolution)
    }

    /// Resolutions requested by subscribers.
    #[must_use]
    pub fn remote(&self) -> Vec<Resolution> {
        self.entries
            .values()
            .filter(|r| r.origin == RequestOrigin::Subscriber)
            .map(|r| r.resolution)
            .collect()
    }

    /// All outstanding requests.
    pub fn requests(&self) -> impl Iterator<Item = &ResolutionRequest> {
        self.entries.values()
    }

    /// Drops every request and presence entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.present.clear();
    }
}
