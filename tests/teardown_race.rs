use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use asset_resolution::{
    Accuracy, DefaultResolutionPolicy, EngineConfig, EventPayload, PolicyError, Resolution,
    ResolutionEngine, ResolutionPolicy, SubscriberId, Trackable, TrackableId,
    TrackableResolutionRequest,
};

/// Blocks inside `resolve` once armed, until released.
struct GatedPolicy {
    inner: DefaultResolutionPolicy,
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl ResolutionPolicy for GatedPolicy {
    fn name(&self) -> &str {
        "gated"
    }

    fn resolve_set(&self, demands: &[Resolution]) -> Result<Resolution, PolicyError> {
        self.inner.resolve_set(demands)
    }

    fn resolve(&self, request: &TrackableResolutionRequest<'_>) -> Result<Resolution, PolicyError> {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.resolve(request)
    }
}

fn fine() -> Resolution {
    Resolution::from_millis(Accuracy::Maximum, 100, 1.0).unwrap()
}

#[test]
fn removal_during_inflight_merge_publishes_nothing_afterwards() {
    let policy = Arc::new(GatedPolicy {
        inner: DefaultResolutionPolicy::new(EngineConfig::default().default_resolution),
        armed: AtomicBool::new(false),
        entered: Barrier::new(2),
        release: Barrier::new(2),
    });
    let engine = Arc::new(ResolutionEngine::new(EngineConfig::default(), policy.clone()).unwrap());
    let id = TrackableId::new("parcel").unwrap();
    engine.add_trackable(Trackable::new(id.clone())).unwrap();

    let resolutions = engine.subscribe_resolutions();
    let events = engine.subscribe_events();
    policy.armed.store(true, Ordering::Release);

    let merger = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        thread::spawn(move || engine.add_subscriber(&id, SubscriberId::new(), Some(fine())))
    };
    policy.entered.wait();

    let remover = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        thread::spawn(move || engine.remove_trackable(&id))
    };
    // Give the remover time to block on the trackable slot.
    thread::sleep(Duration::from_millis(50));
    policy.release.wait();

    let _ = merger.join().unwrap();
    remover.join().unwrap().unwrap();

    assert!(resolutions.try_recv().is_none());
    assert!(engine.effective_resolution(&id).is_err());
    assert!(engine.trackable_ids().unwrap().is_empty());

    let payloads: Vec<_> = events.drain().into_iter().map(|e| e.payload).collect();
    assert_eq!(
        payloads.last(),
        Some(&EventPayload::TrackableRemoved { trackable: id })
    );
}

#[test]
fn inputs_after_removal_are_rejected() {
    let engine = Arc::new(ResolutionEngine::with_default_policy(EngineConfig::default()).unwrap());
    let id = TrackableId::new("parcel").unwrap();
    let resolutions = engine.subscribe_resolutions();
    engine.add_trackable(Trackable::new(id.clone())).unwrap();
    engine.remove_trackable(&id).unwrap();

    let err = engine.set_local_resolution(&id, Some(fine())).unwrap_err();
    assert!(err.is_execution());
    assert!(engine.set_battery_level(Some(5.0)).unwrap().is_empty());
    assert!(resolutions.try_recv().is_none());
}

#[test]
fn concurrent_inputs_across_trackables_do_not_interfere() {
    let engine = Arc::new(ResolutionEngine::with_default_policy(EngineConfig::default()).unwrap());
    let ids: Vec<TrackableId> = (0..8)
        .map(|i| TrackableId::new(format!("t{i}")).unwrap())
        .collect();
    for id in &ids {
        engine.add_trackable(Trackable::new(id.clone())).unwrap();
    }

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for ms in (100..=1000).rev().step_by(100) {
                    let r = Resolution::from_millis(Accuracy::High, ms, 1.0).unwrap();
                    engine.add_subscriber(&id, SubscriberId::new(), Some(r)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = Resolution::from_millis(Accuracy::High, 100, 1.0).unwrap();
    for id in &ids {
        assert_eq!(engine.effective_resolution(id).unwrap(), Some(expected));
        assert_eq!(engine.requests(id).unwrap().len(), 10);
    }
}
