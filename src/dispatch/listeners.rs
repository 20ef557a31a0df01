//! Subscription bookkeeping and fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::warn;

use crate::trackable::TrackableId;

use super::events::{EngineEvent, EventPayload, ResolutionUpdate, SubscriptionId};
use super::stream::{EventStream, ResolutionStream};

/// Pending resolutions, at most one per trackable, oldest change first.
pub(crate) type PendingUpdates = Arc<Mutex<Vec<ResolutionUpdate>>>;

#[derive(Debug)]
struct ResolutionEntry {
    pending: PendingUpdates,
    signal: Sender<()>,
}

/// Owns every listener subscription.
///
/// Publishing only takes short internal locks and uses `try_send`, so it is
/// safe to call while a trackable slot is held.
#[derive(Debug)]
pub(crate) struct ListenerRegistry {
    resolutions: Mutex<HashMap<SubscriptionId, ResolutionEntry>>,
    events: Mutex<HashMap<SubscriptionId, Sender<EngineEvent>>>,
    event_capacity: usize,
    dropped_events: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new(event_capacity: usize) -> Self {
        Self {
            resolutions: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            event_capacity: event_capacity.max(1),
            dropped_events: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe_resolutions(self: &Arc<Self>) -> ResolutionStream {
        let id = SubscriptionId::new();
        let pending: PendingUpdates = Arc::new(Mutex::new(Vec::new()));
        let (signal, wake) = bounded::<()>(1);

        match self.resolutions.lock() {
            Ok(mut subs) => {
                subs.insert(
                    id,
                    ResolutionEntry {
                        pending: Arc::clone(&pending),
                        signal,
                    },
                );
            }
            // Dropping the sender leaves the stream disconnected.
            Err(_) => warn!("resolution listener registry poisoned; stream starts disconnected"),
        }

        ResolutionStream::new(id, pending, wake, Arc::downgrade(self))
    }

    pub(crate) fn subscribe_events(self: &Arc<Self>) -> EventStream {
        let id = SubscriptionId::new();
        let (tx, rx) = bounded::<EngineEvent>(self.event_capacity);

        match self.events.lock() {
            Ok(mut subs) => {
                subs.insert(id, tx);
            }
            Err(_) => warn!("event listener registry poisoned; stream starts disconnected"),
        }

        EventStream::new(id, rx, Arc::downgrade(self))
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subs) = self.resolutions.lock() {
            subs.remove(&id);
        }
        if let Ok(mut subs) = self.events.lock() {
            subs.remove(&id);
        }
    }

    /// Stores `update` as the latest value for its trackable in every
    /// resolution stream, replacing an undelivered older value.
    pub(crate) fn publish_resolution(&self, update: &ResolutionUpdate) {
        let Ok(subs) = self.resolutions.lock() else {
            warn!(
                trackable = %update.trackable,
                "resolution listener registry poisoned; update dropped"
            );
            return;
        };
        for entry in subs.values() {
            let Ok(mut pending) = entry.pending.lock() else {
                continue;
            };
            match pending.iter_mut().find(|p| p.trackable == update.trackable) {
                Some(slot) => slot.resolution = update.resolution,
                None => pending.push(update.clone()),
            }
            drop(pending);
            // A full signal channel already has a wake-up queued.
            let _ = entry.signal.try_send(());
        }
    }

    /// Drops any undelivered resolution for `trackable`.
    pub(crate) fn purge(&self, trackable: &TrackableId) {
        let Ok(subs) = self.resolutions.lock() else {
            return;
        };
        for entry in subs.values() {
            if let Ok(mut pending) = entry.pending.lock() {
                pending.retain(|p| &p.trackable != trackable);
            }
        }
    }

    /// Delivers an event to every event stream without blocking.
    pub(crate) fn emit(&self, payload: EventPayload) {
        let Ok(subs) = self.events.lock() else {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if subs.is_empty() {
            return;
        }
        let event = EngineEvent::new(payload);
        for tx in subs.values() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.dropped_events.fetch_add(1, Ordering::Relaxed);
                    warn!(event = ?event.payload, "event listener is full; event dropped");
                }
            }
        }
    }

    pub(crate) fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        let r = self.resolutions.lock().map(|s| s.len()).unwrap_or(0);
        let e = self.events.lock().map(|s| s.len()).unwrap_or(0);
        r + e
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resolution::{Accuracy, Resolution};

    fn update(id: &str, ms: u64) -> ResolutionUpdate {
        ResolutionUpdate {
            trackable: TrackableId::new(id).unwrap(),
            resolution: Resolution::from_millis(Accuracy::High, ms, 1.0).unwrap(),
        }
    }

    #[test]
    fn resolution_stream_conflates_per_trackable() {
        let registry = Arc::new(ListenerRegistry::new(8));
        let stream = registry.subscribe_resolutions();

        registry.publish_resolution(&update("a", 1));
        registry.publish_resolution(&update("b", 5));
        registry.publish_resolution(&update("a", 2));
        registry.publish_resolution(&update("a", 3));

        let first = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(first, update("a", 3));
        let second = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(second, update("b", 5));
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn purge_removes_pending_value() {
        let registry = Arc::new(ListenerRegistry::new(8));
        let stream = registry.subscribe_resolutions();
        registry.publish_resolution(&update("a", 1));
        registry.purge(&TrackableId::new("a").unwrap());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn full_event_stream_drops_and_counts() {
        let registry = Arc::new(ListenerRegistry::new(1));
        let stream = registry.subscribe_events();
        let t = TrackableId::new("a").unwrap();

        registry.emit(EventPayload::TrackableAdded { trackable: t.clone() });
        registry.emit(EventPayload::TrackableRemoved { trackable: t });
        assert_eq!(registry.dropped_events(), 1);

        let ev = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(ev.payload, EventPayload::TrackableAdded { .. }));
    }

    #[test]
    fn dropping_streams_unsubscribes() {
        let registry = Arc::new(ListenerRegistry::new(4));
        let a = registry.subscribe_resolutions();
        let b = registry.subscribe_events();
        assert_eq!(registry.subscription_count(), 2);
        drop(a);
        b.unsubscribe();
        b.unsubscribe();
        assert_eq!(registry.subscription_count(), 0);
    }
}
