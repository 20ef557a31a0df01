//! Error types for the resolution engine.
//!
//! All errors are strongly typed using thiserror so callers can pattern
//! match on specific conditions.

use thiserror::Error;

use crate::trackable::TrackableId;

/// Validation errors raised while constructing values or configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' must be a finite, non-negative number (got {value})")]
    NegativeOrNonFinite {
        field: &'static str,
        value: f64,
    },

    #[error("Battery level threshold {value} is out of range [0, 100]")]
    BatteryThresholdOutOfRange {
        value: f32,
    },

    #[error("Battery level {value} is out of range [0, 100]")]
    BatteryLevelOutOfRange {
        value: f32,
    },

    #[error("Low battery multiplier must be finite and >= 1 (got {value})")]
    InvalidLowBatteryMultiplier {
        value: f64,
    },

    #[error("Proximity must set at least one of spatial or temporal")]
    EmptyProximity,

    #[error("Trackable id cannot be empty")]
    EmptyTrackableId,

    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised while applying inputs to the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Trackable not found: {id}")]
    TrackableNotFound {
        id: TrackableId,
    },

    #[error("Trackable already exists: {id}")]
    TrackableAlreadyExists {
        id: TrackableId,
    },

    #[error("Queue '{path}' is full (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Channel '{path}' is disconnected")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Resolution policy '{policy}' failed: {reason}")]
    PolicyFailed {
        policy: String,
        reason: String,
    },
}

/// Failure reported by a resolution policy strategy.
///
/// The engine also synthesises one of these when a strategy panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PolicyError {
    /// Human readable failure reason.
    pub reason: String,
}

impl PolicyError {
    /// Creates a policy error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Top-level error type for the crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TrackingError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Shorthand for a missing trackable.
    #[must_use]
    pub fn not_found(id: &TrackableId) -> Self {
        Self::Execution(ExecutionError::TrackableNotFound { id: id.clone() })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. }
            ),
        }
    }
}

/// Result type alias for engine operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

pub(crate) fn lock_err(context: &'static str) -> TrackingError {
    TrackingError::internal(format!("poisoned lock: {context}"))
}
