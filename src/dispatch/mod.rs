//! Listener dispatch.
//!
//! The engine publishes effective resolutions and lifecycle/proximity events
//! to any number of in-process listeners. Publishing never blocks the
//! trackable slot that produced the value: resolution streams conflate to
//! the latest value per trackable, and event streams drop (and count) what
//! does not fit.

/// Event type definitions.
pub mod events;
mod listeners;
/// Subscriber stream handles.
pub mod stream;

pub use events::{EngineEvent, EventPayload, ResolutionUpdate, SubscriptionId};
pub use stream::{EventStream, ResolutionStream};

pub(crate) use listeners::ListenerRegistry;
