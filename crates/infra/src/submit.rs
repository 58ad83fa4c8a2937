//! Admission + enqueue entry point used by ingress adapters.

use std::sync::Arc;

use tracing::{error, info};

use hookrelay_core::{Payload, RelayError, Task};

use crate::admission::RateLimiter;
use crate::broker::TaskBroker;

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Enqueued for delivery.
    Accepted,
    /// The identity exhausted its admission window.
    RateLimited,
    /// Admission or enqueue could not reach the store. The request was not
    /// queued; callers should not admit it.
    InternalError(RelayError),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Runs admission and then enqueues a fresh task.
#[derive(Clone)]
pub struct Submitter {
    limiter: Arc<dyn RateLimiter>,
    broker: Arc<dyn TaskBroker>,
}

impl Submitter {
    pub fn new(limiter: Arc<dyn RateLimiter>, broker: Arc<dyn TaskBroker>) -> Self {
        Self { limiter, broker }
    }

    pub fn submit(&self, identity: &str, payload: impl Into<Payload>) -> SubmitOutcome {
        match self.limiter.allow(identity) {
            Ok(true) => {}
            Ok(false) => return SubmitOutcome::RateLimited,
            Err(e) => {
                error!(identity, error = %e, "admission check failed");
                return SubmitOutcome::InternalError(e);
            }
        }

        let task = Task::new(payload);
        let size = task.payload.len();
        match self.broker.enqueue(task) {
            Ok(()) => {
                info!(identity, payload_bytes = size, "task accepted");
                SubmitOutcome::Accepted
            }
            Err(e) => {
                error!(identity, error = %e, "enqueue failed");
                SubmitOutcome::InternalError(e)
            }
        }
    }
}
