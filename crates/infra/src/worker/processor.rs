//! Per-task delivery state machine.
//!
//! ```text
//! Received ─► attempt delivery ─┬─► Delivered
//!                               └─► Failed ─┬─► attempt_count < max ─► Scheduled for retry
//!                                           └─► otherwise ───────────► Dropped (dead letter)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use hookrelay_core::{
    BackoffPolicy, DeadLetterReason, DeadLetterSink, Delivery, RelayError, Task,
};

use crate::scheduler::RetryScheduler;
use crate::store::SharedStore;

/// Default maximum number of delivery attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Terminal or intermediate result of processing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Delivered,
    RetryScheduled { attempt_count: u32, delay: Duration },
    Dropped(DeadLetterReason),
}

/// Runs the delivery attempt and routes failures.
///
/// The processor owns the task while it runs; `attempt_count` is only ever
/// modified on that private copy.
pub struct TaskProcessor<S> {
    scheduler: Arc<RetryScheduler<S>>,
    backoff: Arc<dyn BackoffPolicy>,
    delivery: Arc<dyn Delivery>,
    dead_letters: Arc<dyn DeadLetterSink>,
    max_attempts: u32,
}

impl<S: SharedStore> TaskProcessor<S> {
    pub fn new(
        scheduler: Arc<RetryScheduler<S>>,
        backoff: Arc<dyn BackoffPolicy>,
        delivery: Arc<dyn Delivery>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            scheduler,
            backoff,
            delivery,
            dead_letters,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt delivery once and apply the failure branch.
    pub fn process(&self, task: Task) -> TaskOutcome {
        debug!(
            attempt = task.attempt_count.saturating_add(1),
            max_attempts = self.max_attempts,
            payload = %task.payload.preview(64),
            "processing task"
        );

        match self.delivery.attempt(&task.payload) {
            Ok(()) => {
                info!(attempt_count = task.attempt_count, "task delivered");
                TaskOutcome::Delivered
            }
            Err(err) => self.handle_failure(task, err),
        }
    }

    fn handle_failure(&self, mut task: Task, err: RelayError) -> TaskOutcome {
        // Backoff is keyed on the count before this failure.
        let delay = self.backoff.next_interval(task.attempt_count);
        let attempt_count = task.record_failure();

        if task.is_exhausted(self.max_attempts) {
            let reason = DeadLetterReason::MaxAttemptsExceeded {
                attempts: attempt_count,
            };
            warn!(attempt_count, error = %err, "delivery failed; attempts exhausted");
            self.dead_letters.capture(&task, &reason);
            return TaskOutcome::Dropped(reason);
        }

        match self.scheduler.schedule(&task, delay) {
            Ok(()) => {
                warn!(
                    attempt_count,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "delivery failed; retry scheduled"
                );
                TaskOutcome::RetryScheduled {
                    attempt_count,
                    delay,
                }
            }
            Err(schedule_err) => {
                error!(
                    attempt_count,
                    error = %schedule_err,
                    "could not schedule retry"
                );
                let reason = DeadLetterReason::RetryScheduleFailed {
                    error: schedule_err.to_string(),
                };
                self.dead_letters.capture(&task, &reason);
                TaskOutcome::Dropped(reason)
            }
        }
    }
}
