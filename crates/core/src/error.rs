//! Error model for the task lifecycle.

use thiserror::Error;

/// Result type used across the relay.
pub type RelayResult<T> = Result<T, RelayError>;

/// Relay-level error.
///
/// Every fallible lifecycle operation (admission, broker, scheduler, delivery)
/// reports one of these. Store failures are transient; serialization failures
/// are permanent for the task that caused them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The caller exceeded its admission window.
    #[error("admission denied for identity `{0}`")]
    AdmissionDenied(String),

    /// The shared store could not be reached or rejected a command.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A task could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The outbound delivery attempt failed.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The task used up its delivery attempts.
    #[error("max attempts exceeded after {attempts} attempts")]
    MaxAttemptsExceeded { attempts: u32 },

    /// A blocking wait was interrupted by the shutdown signal.
    #[error("cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn admission_denied(identity: impl Into<String>) -> Self {
        Self::AdmissionDenied(identity.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Whether the next invocation of the failing operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Delivery(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
