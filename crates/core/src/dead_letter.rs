//! Terminal-failure extension point.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::task::Task;

/// Why a task left the lifecycle without being delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DeadLetterReason {
    /// Every allowed delivery attempt failed.
    MaxAttemptsExceeded { attempts: u32 },
    /// The retry could not be written to the schedule.
    RetryScheduleFailed { error: String },
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxAttemptsExceeded { attempts } => {
                write!(f, "max attempts exceeded ({attempts})")
            }
            Self::RetryScheduleFailed { error } => write!(f, "retry scheduling failed: {error}"),
        }
    }
}

/// Receives tasks that will never be delivered.
///
/// The relay does not persist these; a sink that writes to durable storage
/// can be installed in place of [`LoggingDeadLetterSink`].
pub trait DeadLetterSink: Send + Sync {
    fn capture(&self, task: &Task, reason: &DeadLetterReason);
}

impl<S: DeadLetterSink + ?Sized> DeadLetterSink for Arc<S> {
    fn capture(&self, task: &Task, reason: &DeadLetterReason) {
        (**self).capture(task, reason)
    }
}

/// Default sink: one `warn` line per dropped task.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeadLetterSink;

impl DeadLetterSink for LoggingDeadLetterSink {
    fn capture(&self, task: &Task, reason: &DeadLetterReason) {
        warn!(
            attempt_count = task.attempt_count,
            created_at = ?task.created_at,
            payload = %task.payload.preview(64),
            reason = %reason,
            "dropping task"
        );
    }
}
