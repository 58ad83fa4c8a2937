//! Task broker: durable FIFO of ready-to-run tasks.
//!
//! Producers append to the tail; each pop hands a task to exactly one
//! consumer. Retried tasks are appended like fresh ones, so they queue
//! behind whatever is already waiting.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use hookrelay_core::{RelayError, RelayResult, Task};

use crate::shutdown::ShutdownSignal;
use crate::store::SharedStore;

/// Default list key for ready tasks.
pub const DEFAULT_QUEUE_KEY: &str = "webhook_queue";

/// Default bound on a single blocking wait.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(1);

/// FIFO channel for ready tasks.
pub trait TaskBroker: Send + Sync {
    /// Append `task`, stamping `created_at` if unset. Safe for concurrent producers.
    fn enqueue(&self, task: Task) -> RelayResult<()>;

    /// Take the next task.
    ///
    /// - `Ok(Some(task))`: a task for this consumer only
    /// - `Ok(None)`: heartbeat elapsed with nothing to do; call again
    /// - `Err(RelayError::Cancelled)`: `shutdown` was raised
    /// - `Err(RelayError::Serialization(_))`: the popped value was malformed
    ///   and has been discarded
    /// - `Err(RelayError::StoreUnavailable(_))`: transient store failure
    fn dequeue(&self, shutdown: &ShutdownSignal) -> RelayResult<Option<Task>>;
}

impl<B: TaskBroker + ?Sized> TaskBroker for Arc<B> {
    fn enqueue(&self, task: Task) -> RelayResult<()> {
        (**self).enqueue(task)
    }

    fn dequeue(&self, shutdown: &ShutdownSignal) -> RelayResult<Option<Task>> {
        (**self).dequeue(shutdown)
    }
}

/// Broker over a [`SharedStore`] list.
#[derive(Debug, Clone)]
pub struct StoreBroker<S> {
    store: S,
    queue_key: String,
    heartbeat: Duration,
}

impl<S: SharedStore> StoreBroker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }
}

impl<S: SharedStore> TaskBroker for StoreBroker<S> {
    fn enqueue(&self, mut task: Task) -> RelayResult<()> {
        task.ensure_created_at();
        let encoded = task.encode()?;
        self.store.list_push(&self.queue_key, &encoded)?;

        trace!(queue = %self.queue_key, attempt_count = task.attempt_count, "task enqueued");
        Ok(())
    }

    fn dequeue(&self, shutdown: &ShutdownSignal) -> RelayResult<Option<Task>> {
        if shutdown.is_triggered() {
            return Err(RelayError::Cancelled);
        }

        match self.store.list_pop_blocking(&self.queue_key, self.heartbeat)? {
            // A task already popped is owned by this consumer; hand it over
            // even if shutdown fired during the wait.
            Some(raw) => Task::decode(&raw).map(Some),
            None if shutdown.is_triggered() => Err(RelayError::Cancelled),
            None => Ok(None),
        }
    }
}
