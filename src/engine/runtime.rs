//! Threaded input runtime.
//!
//! Location fixes, demand changes and battery samples arrive on arbitrary
//! threads. `TrackingRuntime` funnels them through one bounded queue into a
//! worker thread that applies them to the engine in submission order, so a
//! callback thread never waits on a trackable slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::dispatch::{ResolutionUpdate, SubscriptionId};
use crate::error::{ExecutionError, TrackingError, TrackingResult};
use crate::registry::SubscriberId;
use crate::resolution::Resolution;
use crate::throttle::LocationDecision;
use crate::trackable::{Destination, LocationFix, Trackable, TrackableId};

use super::ResolutionEngine;

const INPUT_PATH: &str = "engine_input";

/// One input for the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// Start tracking.
    AddTrackable(Trackable),
    /// Stop tracking.
    RemoveTrackable(TrackableId),
    /// Set or clear the LOCAL request.
    SetLocalResolution {
        /// Target trackable.
        trackable: TrackableId,
        /// New request, `None` to clear.
        resolution: Option<Resolution>,
    },
    /// A subscriber became present.
    AddSubscriber {
        /// Target trackable.
        trackable: TrackableId,
        /// Subscriber identity.
        subscriber: SubscriberId,
        /// Initial request, if any.
        resolution: Option<Resolution>,
    },
    /// A subscriber changed its request.
    UpdateSubscriberResolution {
        /// Target trackable.
        trackable: TrackableId,
        /// Subscriber identity.
        subscriber: SubscriberId,
        /// New request, `None` to clear.
        resolution: Option<Resolution>,
    },
    /// A subscriber left.
    RemoveSubscriber {
        /// Target trackable.
        trackable: TrackableId,
        /// Subscriber identity.
        subscriber: SubscriberId,
    },
    /// Set or clear the destination.
    SetDestination {
        /// Target trackable.
        trackable: TrackableId,
        /// New destination, `None` to clear.
        destination: Option<Destination>,
    },
    /// A raw location fix.
    Location {
        /// Target trackable.
        trackable: TrackableId,
        /// The fix.
        fix: LocationFix,
    },
    /// Battery percentage sample, `None` for unknown.
    BatteryLevel(Option<f32>),
}

/// Receives committed resolutions, e.g. to reconfigure the location provider.
pub trait ResolutionSink: Send + 'static {
    /// Applies a new effective resolution.
    fn apply(&mut self, update: ResolutionUpdate);
}

impl<F> ResolutionSink for F
where
    F: FnMut(ResolutionUpdate) + Send + 'static,
{
    fn apply(&mut self, update: ResolutionUpdate) {
        self(update);
    }
}

/// Receives fixes that passed the throttle.
pub trait LocationSink: Send + 'static {
    /// Forwards `fix`, preceded by the fixes skipped since the last one.
    fn publish(&mut self, trackable: &TrackableId, fix: LocationFix, skipped: Vec<LocationFix>);
}

impl<F> LocationSink for F
where
    F: FnMut(&TrackableId, LocationFix, Vec<LocationFix>) + Send + 'static,
{
    fn publish(&mut self, trackable: &TrackableId, fix: LocationFix, skipped: Vec<LocationFix>) {
        self(trackable, fix, skipped);
    }
}

enum Job {
    Input(EngineInput),
    Flush(Sender<()>),
}

struct Worker {
    engine: Arc<ResolutionEngine>,
    locations: Option<Box<dyn LocationSink>>,
    rejected: Arc<AtomicU64>,
}

impl Worker {
    fn run(mut self, rx: &Receiver<Job>) {
        while let Ok(job) = rx.recv() {
            match job {
                Job::Input(input) => {
                    if let Err(err) = self.apply(input) {
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, "engine input rejected");
                    }
                }
                Job::Flush(reply) => {
                    let _ = reply.send(());
                }
            }
        }
        debug!("input worker stopped");
    }

    fn apply(&mut self, input: EngineInput) -> TrackingResult<()> {
        let engine = &self.engine;
        match input {
            EngineInput::AddTrackable(trackable) => {
                engine.add_trackable(trackable)?;
            }
            EngineInput::RemoveTrackable(id) => {
                engine.remove_trackable(&id)?;
            }
            EngineInput::SetLocalResolution {
                trackable,
                resolution,
            } => {
                engine.set_local_resolution(&trackable, resolution)?;
            }
            EngineInput::AddSubscriber {
                trackable,
                subscriber,
                resolution,
            } => {
                engine.add_subscriber(&trackable, subscriber, resolution)?;
            }
            EngineInput::UpdateSubscriberResolution {
                trackable,
                subscriber,
                resolution,
            } => {
                engine.update_subscriber_resolution(&trackable, subscriber, resolution)?;
            }
            EngineInput::RemoveSubscriber {
                trackable,
                subscriber,
            } => {
                engine.remove_subscriber(&trackable, subscriber)?;
            }
            EngineInput::SetDestination {
                trackable,
                destination,
            } => {
                engine.set_destination(&trackable, destination)?;
            }
            EngineInput::Location { trackable, fix } => {
                let decision = engine.ingest_location(&trackable, fix)?;
                if let (LocationDecision::Publish { fix, skipped }, Some(sink)) =
                    (decision, self.locations.as_mut())
                {
                    sink.publish(&trackable, fix, skipped);
                }
            }
            EngineInput::BatteryLevel(level) => {
                engine.set_battery_level(level)?;
            }
        }
        Ok(())
    }
}

/// Owns the input worker and any attached sink pumps.
///
/// Dropping the runtime applies every queued input, then stops the worker
/// and the pumps and joins their threads.
pub struct TrackingRuntime {
    engine: Arc<ResolutionEngine>,
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    pumps: Vec<(SubscriptionId, JoinHandle<()>)>,
    queue_capacity: usize,
    rejected: Arc<AtomicU64>,
}

impl std::fmt::Debug for TrackingRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingRuntime")
            .field("queue_capacity", &self.queue_capacity)
            .field("pumps", &self.pumps.len())
            .field("rejected", &self.rejected_inputs())
            .finish_non_exhaustive()
    }
}

impl TrackingRuntime {
    /// Starts the input worker for `engine`.
    ///
    /// # Errors
    /// Internal error if the worker thread cannot be spawned.
    pub fn new(engine: Arc<ResolutionEngine>) -> TrackingResult<Self> {
        Self::start(engine, None)
    }

    /// Starts the input worker, forwarding throttled fixes to `sink`.
    ///
    /// # Errors
    /// Internal error if the worker thread cannot be spawned.
    pub fn with_location_sink(
        engine: Arc<ResolutionEngine>,
        sink: impl LocationSink,
    ) -> TrackingResult<Self> {
        Self::start(engine, Some(Box::new(sink)))
    }

    fn start(
        engine: Arc<ResolutionEngine>,
        locations: Option<Box<dyn LocationSink>>,
    ) -> TrackingResult<Self> {
        let queue_capacity = engine.config().input_queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);
        let rejected = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            engine: Arc::clone(&engine),
            locations,
            rejected: Arc::clone(&rejected),
        };
        let handle = thread::Builder::new()
            .name("asset-resolution-input".to_string())
            .spawn(move || worker.run(&rx))
            .map_err(|e| TrackingError::internal(format!("failed to spawn input worker: {e}")))?;

        Ok(Self {
            engine,
            tx: Some(tx),
            worker: Some(handle),
            pumps: Vec::new(),
            queue_capacity,
            rejected,
        })
    }

    /// The engine behind this runtime.
    #[must_use]
    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    /// Queues `input` without blocking.
    ///
    /// # Errors
    /// `QueueFull` when the queue is at capacity, `Disconnected` if the
    /// worker has stopped.
    pub fn try_submit(&self, input: EngineInput) -> TrackingResult<()> {
        let tx = self.sender()?;
        match tx.try_send(Job::Input(input)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                path: INPUT_PATH.to_string(),
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(disconnected()),
        }
    }

    /// Queues `input`, waiting for room if the queue is full.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn submit(&self, input: EngineInput) -> TrackingResult<()> {
        self.sender()?
            .send(Job::Input(input))
            .map_err(|_| disconnected())
    }

    /// Blocks until every input queued before this call has been applied.
    ///
    /// # Errors
    /// `Disconnected` if the worker has stopped.
    pub fn flush(&self) -> TrackingResult<()> {
        let (reply, done) = bounded::<()>(1);
        self.sender()?
            .send(Job::Flush(reply))
            .map_err(|_| disconnected())?;
        done.recv().map_err(|_| disconnected())
    }

    /// Forwards the conflated resolution stream into `sink` on its own thread.
    ///
    /// # Errors
    /// Internal error if the pump thread cannot be spawned.
    pub fn attach_resolution_sink(&mut self, mut sink: impl ResolutionSink) -> TrackingResult<()> {
        let stream = self.engine.subscribe_resolutions();
        let subscription = stream.subscription_id();
        let handle = thread::Builder::new()
            .name("asset-resolution-sink".to_string())
            .spawn(move || {
                while let Ok(update) = stream.recv() {
                    sink.apply(update);
                }
                debug!("resolution sink pump stopped");
            })
            .map_err(|e| TrackingError::internal(format!("failed to spawn sink pump: {e}")))?;
        self.pumps.push((subscription, handle));
        Ok(())
    }

    /// Inputs the engine rejected, e.g. for an unknown trackable.
    #[must_use]
    pub fn rejected_inputs(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn sender(&self) -> TrackingResult<&Sender<Job>> {
        self.tx.as_ref().ok_or_else(disconnected)
    }
}

fn disconnected() -> TrackingError {
    ExecutionError::Disconnected {
        path: INPUT_PATH.to_string(),
    }
    .into()
}

impl Drop for TrackingRuntime {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued inputs, then exit.
        drop(self.tx.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        // Unsubscribing disconnects each pump once its mailbox is drained.
        for (subscription, handle) in self.pumps.drain(..) {
            self.engine.unsubscribe(subscription);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::resolution::Accuracy;
    use crate::trackable::Coordinate;

    fn id(s: &str) -> TrackableId {
        TrackableId::new(s).unwrap()
    }

    fn engine(capacity: usize) -> Arc<ResolutionEngine> {
        let config = EngineConfig {
            input_queue_capacity: capacity,
            ..EngineConfig::default()
        };
        Arc::new(ResolutionEngine::with_default_policy(config).unwrap())
    }

    #[test]
    fn inputs_apply_in_order() {
        let runtime = TrackingRuntime::new(engine(16)).unwrap();
        let t = id("a");
        let fine = Resolution::from_millis(Accuracy::Maximum, 100, 1.0).unwrap();

        runtime.submit(EngineInput::AddTrackable(Trackable::new(t.clone()))).unwrap();
        runtime
            .try_submit(EngineInput::SetLocalResolution {
                trackable: t.clone(),
                resolution: Some(fine),
            })
            .unwrap();
        runtime.flush().unwrap();

        assert_eq!(runtime.engine().effective_resolution(&t).unwrap(), Some(fine));
        assert_eq!(runtime.rejected_inputs(), 0);
    }

    #[test]
    fn rejected_inputs_are_counted() {
        let runtime = TrackingRuntime::new(engine(4)).unwrap();
        runtime.submit(EngineInput::RemoveTrackable(id("ghost"))).unwrap();
        runtime.submit(EngineInput::BatteryLevel(Some(400.0))).unwrap();
        runtime.flush().unwrap();
        assert_eq!(runtime.rejected_inputs(), 2);
    }

    #[test]
    fn full_queue_reports_queue_full() {
        let gate = Arc::new(Mutex::new(()));
        let engine = engine(1);
        let held = gate.lock().unwrap();
        let blocker = Arc::clone(&gate);
        let sink = move |_: &TrackableId, _: LocationFix, _: Vec<LocationFix>| {
            let _guard = blocker.lock();
        };
        let runtime = TrackingRuntime::with_location_sink(Arc::clone(&engine), sink).unwrap();

        let t = id("a");
        runtime.submit(EngineInput::AddTrackable(Trackable::new(t.clone()))).unwrap();
        let fix = LocationFix::new(Coordinate::new(0.0, 0.0).unwrap(), Utc::now());
        // The first fix is always published, so the worker parks in the sink.
        runtime
            .submit(EngineInput::Location {
                trackable: t.clone(),
                fix,
            })
            .unwrap();

        let mut saw_full = false;
        for _ in 0..8 {
            if let Err(err) = runtime.try_submit(EngineInput::BatteryLevel(None)) {
                assert!(err.is_retryable());
                saw_full = true;
                break;
            }
        }
        assert!(saw_full);
        drop(held);
    }

    #[test]
    fn resolution_sink_receives_updates_and_stops_on_drop() {
        let engine = engine(16);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = Arc::clone(&received);
        let t = id("a");
        {
            let mut runtime = TrackingRuntime::new(Arc::clone(&engine)).unwrap();
            runtime
                .attach_resolution_sink(move |update: ResolutionUpdate| {
                    sink_received.lock().unwrap().push(update);
                })
                .unwrap();
            runtime.submit(EngineInput::AddTrackable(Trackable::new(t.clone()))).unwrap();
        }

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].trackable, t);
        assert_eq!(
            received[0].resolution,
            EngineConfig::default().default_resolution
        );
    }
}
