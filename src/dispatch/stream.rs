use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::{ExecutionError, TrackingError, TrackingResult};

use super::events::{EngineEvent, ResolutionUpdate, SubscriptionId};
use super::listeners::{ListenerRegistry, PendingUpdates};

fn disconnected(path: &str) -> TrackingError {
    TrackingError::Execution(ExecutionError::Disconnected {
        path: path.to_string(),
    })
}

fn timed_out(timeout: Duration) -> TrackingError {
    TrackingError::Execution(ExecutionError::Timeout {
        duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    })
}

/// Conflated stream of effective resolutions.
///
/// Holds at most one undelivered resolution per trackable; a newer value
/// replaces an older one that has not been received yet. Dropping the
/// stream unsubscribes it.
#[derive(Debug)]
pub struct ResolutionStream {
    subscription_id: SubscriptionId,
    pending: PendingUpdates,
    wake: Receiver<()>,
    registry: Weak<ListenerRegistry>,
    unregistered: AtomicBool,
}

impl ResolutionStream {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        pending: PendingUpdates,
        wake: Receiver<()>,
        registry: Weak<ListenerRegistry>,
    ) -> Self {
        Self {
            subscription_id,
            pending,
            wake,
            registry,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Takes the oldest pending update without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<ResolutionUpdate> {
        let mut pending = self.pending.lock().ok()?;
        if pending.is_empty() {
            None
        } else {
            Some(pending.remove(0))
        }
    }

    /// Receive the next update (blocking).
    ///
    /// # Errors
    /// `Disconnected` once the engine is gone and nothing is pending.
    pub fn recv(&self) -> TrackingResult<ResolutionUpdate> {
        loop {
            if let Some(update) = self.try_recv() {
                return Ok(update);
            }
            if self.wake.recv().is_err() {
                return self.try_recv().ok_or_else(|| disconnected("resolution_stream"));
            }
        }
    }

    /// Receive the next update with a timeout.
    ///
    /// # Errors
    /// `Timeout` if nothing arrived in time, `Disconnected` once the engine
    /// is gone and nothing is pending.
    pub fn recv_timeout(&self, timeout: Duration) -> TrackingResult<ResolutionUpdate> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(update) = self.try_recv() {
                return Ok(update);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.wake.recv_timeout(remaining) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    return self.try_recv().ok_or_else(|| timed_out(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return self.try_recv().ok_or_else(|| disconnected("resolution_stream"));
                }
            }
        }
    }

    /// Explicit unregistration. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.subscription_id);
        }
    }
}

impl Drop for ResolutionStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Stream of lifecycle, proximity and policy-failure events.
///
/// Backed by a bounded queue; events that do not fit are dropped and
/// counted by the engine. Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct EventStream {
    subscription_id: SubscriptionId,
    rx: Receiver<EngineEvent>,
    registry: Weak<ListenerRegistry>,
    unregistered: AtomicBool,
}

impl EventStream {
    pub(crate) fn new(
        subscription_id: SubscriptionId,
        rx: Receiver<EngineEvent>,
        registry: Weak<ListenerRegistry>,
    ) -> Self {
        Self {
            subscription_id,
            rx,
            registry,
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Takes the next queued event without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Receive the next event (blocking).
    ///
    /// # Errors
    /// `Disconnected` once the engine is gone and the queue is drained.
    pub fn recv(&self) -> TrackingResult<EngineEvent> {
        self.rx.recv().map_err(|_| disconnected("event_stream"))
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    /// `Timeout` or `Disconnected`.
    pub fn recv_timeout(&self, timeout: Duration) -> TrackingResult<EngineEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => timed_out(timeout),
            RecvTimeoutError::Disconnected => disconnected("event_stream"),
        })
    }

    /// Drains every queued event.
    #[must_use]
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }

    /// Explicit unregistration. Idempotent.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.subscription_id);
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
