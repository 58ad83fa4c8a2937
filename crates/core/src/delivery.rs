//! Outbound delivery capability.

use std::sync::Arc;

use crate::error::RelayResult;
use crate::task::Payload;

/// Attempts to deliver a payload to its destination.
///
/// Implementations may block for the duration of the outbound call and are
/// expected to bound it themselves. `Err(RelayError::Delivery(..))` drives the
/// retry state machine; any error counts as a failed attempt.
pub trait Delivery: Send + Sync {
    fn attempt(&self, payload: &Payload) -> RelayResult<()>;
}

impl<D: Delivery + ?Sized> Delivery for Arc<D> {
    fn attempt(&self, payload: &Payload) -> RelayResult<()> {
        (**self).attempt(payload)
    }
}
