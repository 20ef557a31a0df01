//! State owner for every tracked asset.
//!
//! `ResolutionEngine` holds one mutex-guarded slot per trackable. Every input
//! for a trackable (demand changes, location fixes, destination updates,
//! battery samples) locks that slot, applies the change, re-runs the policy
//! inline and commits the result. Commits are de-duplicated by value and
//! published to listeners without blocking.

mod slot;

/// Threaded input runtime and sink adapters.
pub mod runtime;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::dispatch::{
    EventPayload, EventStream, ListenerRegistry, ResolutionStream, ResolutionUpdate,
    SubscriptionId,
};
use crate::error::{
    lock_err, ExecutionError, PolicyError, TrackingError, TrackingResult, ValidationError,
};
use crate::policy::{
    DefaultResolutionPolicy, ResolutionPolicy, ResolutionState, TrackableResolutionRequest,
};
use crate::proximity::{ProximityState, ProximityTransition};
use crate::registry::{RequestKey, ResolutionRequest, SubscriberId, TrackableRequests};
use crate::resolution::Resolution;
use crate::throttle::LocationDecision;
use crate::trackable::{Destination, LocationFix, Trackable, TrackableId};

use slot::{TrackableSlot, TrackableState};

/// Adaptive resolution engine.
pub struct ResolutionEngine {
    config: EngineConfig,
    policy: Arc<dyn ResolutionPolicy>,
    trackables: RwLock<HashMap<TrackableId, Arc<TrackableSlot>>>,
    battery_level: RwLock<Option<f32>>,
    listeners: Arc<ListenerRegistry>,
    policy_failures: AtomicU64,
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("policy_failures", &self.policy_failures())
            .finish_non_exhaustive()
    }
}

impl ResolutionEngine {
    /// Create an engine with a custom policy strategy.
    ///
    /// # Errors
    /// Returns a validation error if `config` is invalid.
    pub fn new(config: EngineConfig, policy: Arc<dyn ResolutionPolicy>) -> TrackingResult<Self> {
        config.validate()?;
        let listeners = Arc::new(ListenerRegistry::new(config.event_stream_capacity));
        Ok(Self {
            config,
            policy,
            trackables: RwLock::new(HashMap::new()),
            battery_level: RwLock::new(None),
            listeners,
            policy_failures: AtomicU64::new(0),
        })
    }

    /// Create an engine using [`DefaultResolutionPolicy`] with the configured
    /// default resolution.
    ///
    /// # Errors
    /// Returns a validation error if `config` is invalid.
    pub fn with_default_policy(config: EngineConfig) -> TrackingResult<Self> {
        let policy = Arc::new(DefaultResolutionPolicy::new(config.default_resolution));
        Self::new(config, policy)
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the installed policy strategy.
    #[must_use]
    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts tracking `trackable` and commits its initial resolution.
    ///
    /// Returns the committed resolution, or `None` if the policy failed.
    ///
    /// # Errors
    /// `TrackableAlreadyExists` if the id is already tracked.
    pub fn add_trackable(&self, trackable: Trackable) -> TrackingResult<Option<Resolution>> {
        let id = trackable.id.clone();
        let slot = Arc::new(TrackableSlot::new(TrackableState::new(
            trackable,
            self.config.proximity_mode,
        )));
        // Held across the insert so no other input for this id can run before
        // the added event and the initial commit.
        let mut state = slot.lock()?;
        {
            let mut map = self.trackables.write().map_err(|_| lock_err("trackables"))?;
            if map.contains_key(&id) {
                return Err(ExecutionError::TrackableAlreadyExists { id }.into());
            }
            map.insert(id.clone(), Arc::clone(&slot));
        }

        info!(trackable = %id, "trackable added");
        self.listeners.emit(EventPayload::TrackableAdded {
            trackable: id.clone(),
        });
        self.reevaluate(&mut state)
    }

    /// Stops tracking `id`.
    ///
    /// Registry entries, proximity state and any undelivered resolution are
    /// cleared under the trackable's slot, so a merge racing with removal is
    /// never published afterwards. Returns the trackable as it was last known.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn remove_trackable(&self, id: &TrackableId) -> TrackingResult<Trackable> {
        let slot = self
            .trackables
            .write()
            .map_err(|_| lock_err("trackables"))?
            .remove(id)
            .ok_or_else(|| TrackingError::not_found(id))?;

        let mut state = slot.lock()?;
        if let Some(ProximityTransition::Cancelled) = state.tear_down() {
            debug!(trackable = %id, "proximity cancelled by removal");
            self.listeners.emit(EventPayload::ProximityCancelled {
                trackable: id.clone(),
            });
        }
        self.listeners.purge(id);
        self.listeners.emit(EventPayload::TrackableRemoved {
            trackable: id.clone(),
        });
        info!(trackable = %id, "trackable removed");
        Ok(state.trackable.clone())
    }

    // ------------------------------------------------------------------
    // Demand
    // ------------------------------------------------------------------

    /// Sets or clears the publisher's own (LOCAL) request for `id`.
    ///
    /// Returns the newly committed resolution, if the effective value changed.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn set_local_resolution(
        &self,
        id: &TrackableId,
        resolution: Option<Resolution>,
    ) -> TrackingResult<Option<Resolution>> {
        self.with_slot(id, |state| {
            if state.requests.set(RequestKey::Local, resolution) {
                self.reevaluate(state)
            } else {
                Ok(None)
            }
        })
    }

    /// Marks `subscriber` present for `id`, optionally with a request.
    ///
    /// Without a request an existing one is kept.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn add_subscriber(
        &self,
        id: &TrackableId,
        subscriber: SubscriberId,
        resolution: Option<Resolution>,
    ) -> TrackingResult<Option<Resolution>> {
        self.join_subscriber(id, subscriber, |requests| {
            resolution.is_some_and(|r| requests.set(RequestKey::Subscriber(subscriber), Some(r)))
        })
    }

    /// Replaces or clears the request of `subscriber` for `id`.
    ///
    /// A subscriber that was not yet present becomes present.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn update_subscriber_resolution(
        &self,
        id: &TrackableId,
        subscriber: SubscriberId,
        resolution: Option<Resolution>,
    ) -> TrackingResult<Option<Resolution>> {
        self.join_subscriber(id, subscriber, |requests| {
            requests.set(RequestKey::Subscriber(subscriber), resolution)
        })
    }

    fn join_subscriber(
        &self,
        id: &TrackableId,
        subscriber: SubscriberId,
        update: impl FnOnce(&mut TrackableRequests) -> bool,
    ) -> TrackingResult<Option<Resolution>> {
        self.with_slot(id, |state| {
            let joined = state.requests.add_subscriber(subscriber);
            let changed = update(&mut state.requests);
            if joined {
                debug!(trackable = %id, %subscriber, "subscriber present");
            }
            if joined || changed {
                self.reevaluate(state)
            } else {
                Ok(None)
            }
        })
    }

    /// Removes `subscriber` and its request from `id`.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn remove_subscriber(
        &self,
        id: &TrackableId,
        subscriber: SubscriberId,
    ) -> TrackingResult<Option<Resolution>> {
        self.with_slot(id, |state| {
            if state.requests.remove_subscriber(subscriber) {
                debug!(trackable = %id, %subscriber, "subscriber gone");
                self.reevaluate(state)
            } else {
                Ok(None)
            }
        })
    }

    // ------------------------------------------------------------------
    // Location, destination, battery
    // ------------------------------------------------------------------

    /// Sets or clears the destination of `id`.
    ///
    /// Leaving `Reached` this way emits `ProximityCancelled`; a new
    /// destination re-arms the monitor.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn set_destination(
        &self,
        id: &TrackableId,
        destination: Option<Destination>,
    ) -> TrackingResult<Option<Resolution>> {
        self.with_slot(id, |state| {
            state.trackable.destination = destination;
            match state.monitor.set_destination(destination) {
                Some(transition) => {
                    self.announce(id, transition);
                    self.reevaluate(state)
                }
                None => Ok(None),
            }
        })
    }

    /// Feeds a location fix for `id`.
    ///
    /// The fix drives the proximity monitor and a re-evaluation, then is
    /// throttled against the effective resolution.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn ingest_location(
        &self,
        id: &TrackableId,
        fix: LocationFix,
    ) -> TrackingResult<LocationDecision> {
        self.with_slot(id, |state| {
            if let Some(transition) = state.monitor.observe(&fix) {
                self.announce(id, transition);
            }
            self.reevaluate(state)?;
            let effective = state.last_published;
            Ok(state.throttle.offer(fix, effective.as_ref()))
        })
    }

    /// Records the publisher's battery percentage and re-evaluates every
    /// trackable. `None` means unknown.
    ///
    /// Returns the resolutions that changed.
    ///
    /// # Errors
    /// `BatteryLevelOutOfRange` for values outside `[0, 100]`.
    pub fn set_battery_level(&self, level: Option<f32>) -> TrackingResult<Vec<ResolutionUpdate>> {
        if let Some(value) = level {
            if !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::BatteryLevelOutOfRange { value }.into());
            }
        }
        {
            let mut battery = self.battery_level.write().map_err(|_| lock_err("battery level"))?;
            if *battery == level {
                return Ok(Vec::new());
            }
            *battery = level;
        }
        debug!(?level, "battery level changed");

        let mut updates = Vec::new();
        for slot in self.slots()? {
            let mut state = slot.lock()?;
            if state.removed {
                continue;
            }
            if let Some(resolution) = self.reevaluate(&mut state)? {
                updates.push(ResolutionUpdate {
                    trackable: state.trackable.id.clone(),
                    resolution,
                });
            }
        }
        Ok(updates)
    }

    // ------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------

    /// Merges a bare demand set through the installed policy.
    ///
    /// # Errors
    /// `PolicyFailed` if the policy returns an error or panics.
    pub fn resolve_demands(&self, demands: &[Resolution]) -> TrackingResult<Resolution> {
        self.run_policy(|policy| policy.resolve_set(demands))
            .map_err(|err| {
                self.policy_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    policy = self.policy.name(),
                    reason = %err.reason,
                    "resolution policy failed"
                );
                ExecutionError::PolicyFailed {
                    policy: self.policy.name().to_string(),
                    reason: err.reason,
                }
                .into()
            })
    }

    /// Number of policy failures contained so far.
    #[must_use]
    pub fn policy_failures(&self) -> u64 {
        self.policy_failures.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The last committed resolution for `id`.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn effective_resolution(&self, id: &TrackableId) -> TrackingResult<Option<Resolution>> {
        self.with_slot(id, |state| Ok(state.last_published))
    }

    /// Current proximity monitor state for `id`.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn proximity_state(&self, id: &TrackableId) -> TrackingResult<ProximityState> {
        self.with_slot(id, |state| Ok(state.monitor.state()))
    }

    /// Snapshot of the trackable, including its current destination.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn trackable(&self, id: &TrackableId) -> TrackingResult<Trackable> {
        self.with_slot(id, |state| Ok(state.trackable.clone()))
    }

    /// Outstanding requests for `id`.
    ///
    /// # Errors
    /// `TrackableNotFound` if `id` is not tracked.
    pub fn requests(&self, id: &TrackableId) -> TrackingResult<Vec<ResolutionRequest>> {
        self.with_slot(id, |state| Ok(state.requests.requests().cloned().collect()))
    }

    /// Ids of every tracked asset, sorted.
    ///
    /// # Errors
    /// Internal error if the trackable map is poisoned.
    pub fn trackable_ids(&self) -> TrackingResult<Vec<TrackableId>> {
        let map = self.trackables.read().map_err(|_| lock_err("trackables"))?;
        let mut ids: Vec<TrackableId> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Last recorded battery percentage.
    ///
    /// # Errors
    /// Internal error if the battery lock is poisoned.
    pub fn battery_level(&self) -> TrackingResult<Option<f32>> {
        self.battery_level
            .read()
            .map(|b| *b)
            .map_err(|_| lock_err("battery level"))
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Opens a conflating stream of committed resolutions.
    #[must_use]
    pub fn subscribe_resolutions(&self) -> ResolutionStream {
        self.listeners.subscribe_resolutions()
    }

    /// Opens a bounded stream of engine events.
    #[must_use]
    pub fn subscribe_events(&self) -> EventStream {
        self.listeners.subscribe_events()
    }

    /// Events dropped because a listener queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.listeners.dropped_events()
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.unsubscribe(id);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn slot(&self, id: &TrackableId) -> TrackingResult<Arc<TrackableSlot>> {
        self.trackables
            .read()
            .map_err(|_| lock_err("trackables"))?
            .get(id)
            .cloned()
            .ok_or_else(|| TrackingError::not_found(id))
    }

    fn slots(&self) -> TrackingResult<Vec<Arc<TrackableSlot>>> {
        let map = self.trackables.read().map_err(|_| lock_err("trackables"))?;
        Ok(map.values().cloned().collect())
    }

    fn with_slot<T>(
        &self,
        id: &TrackableId,
        f: impl FnOnce(&mut TrackableState) -> TrackingResult<T>,
    ) -> TrackingResult<T> {
        let slot = self.slot(id)?;
        let mut state = slot.lock()?;
        if state.removed {
            return Err(TrackingError::not_found(id));
        }
        f(&mut state)
    }

    fn announce(&self, id: &TrackableId, transition: ProximityTransition) {
        match transition {
            ProximityTransition::Reached(threshold) => {
                debug!(trackable = %id, ?threshold, "proximity reached");
                self.listeners.emit(EventPayload::ProximityReached {
                    trackable: id.clone(),
                    threshold,
                });
            }
            ProximityTransition::Cancelled => {
                debug!(trackable = %id, "proximity cancelled");
                self.listeners.emit(EventPayload::ProximityCancelled {
                    trackable: id.clone(),
                });
            }
        }
    }

    /// Runs the policy for one trackable and commits the outcome.
    ///
    /// Must be called with the trackable's slot locked. A failing policy
    /// leaves the previous resolution in place.
    fn reevaluate(&self, state: &mut TrackableState) -> TrackingResult<Option<Resolution>> {
        let battery_level = self.battery_level()?;
        let remote = state.requests.remote();
        let request = TrackableResolutionRequest {
            trackable: &state.trackable,
            local: state.requests.local(),
            remote: &remote,
            state: ResolutionState {
                proximity_reached: state.monitor.is_reached(),
                subscriber_present: state.requests.subscriber_present(),
                battery_level,
            },
        };

        let outcome = self.run_policy(|policy| policy.resolve(&request));
        let id = state.trackable.id.clone();
        let resolution = match outcome {
            Ok(resolution) => resolution,
            Err(err) => {
                self.report_policy_failure(&id, &err);
                return Ok(None);
            }
        };

        if !state.commit(resolution) {
            return Ok(None);
        }
        debug!(trackable = %id, %resolution, "resolution committed");
        self.listeners.publish_resolution(&ResolutionUpdate {
            trackable: id,
            resolution,
        });
        Ok(Some(resolution))
    }

    fn run_policy<F>(&self, f: F) -> Result<Resolution, PolicyError>
    where
        F: FnOnce(&dyn ResolutionPolicy) -> Result<Resolution, PolicyError>,
    {
        let policy = self.policy.as_ref();
        match panic::catch_unwind(AssertUnwindSafe(|| f(policy))) {
            Ok(result) => result,
            Err(payload) => Err(PolicyError::new(panic_reason(payload.as_ref()))),
        }
    }

    fn report_policy_failure(&self, id: &TrackableId, err: &PolicyError) {
        self.policy_failures.fetch_add(1, Ordering::Relaxed);
        error!(
            trackable = %id,
            policy = self.policy.name(),
            reason = %err.reason,
            "resolution policy failed; keeping previous resolution"
        );
        self.listeners.emit(EventPayload::PolicyFailed {
            trackable: id.clone(),
            policy: self.policy.name().to_string(),
            reason: err.reason.clone(),
        });
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("policy panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("policy panicked: {s}")
    } else {
        "policy panicked".to_string()
    }
}
