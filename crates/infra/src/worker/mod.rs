//! Worker pool: N threads competing on one broker.
//!
//! ## Lifecycle
//!
//! Each worker loops on [`TaskBroker::dequeue`](crate::broker::TaskBroker::dequeue)
//! and hands every task to a shared [`TaskProcessor`]. Broker errors never
//! kill a worker; they are logged and the worker pauses before trying again.
//! Stopping the pool raises the shared signal; idle workers notice within one
//! heartbeat and busy workers finish their current task first.

mod pool;
mod processor;

pub use pool::{
    DEFAULT_ERROR_PAUSE, DEFAULT_WORKER_COUNT, PoolStats, WorkerPool, WorkerPoolConfig,
    WorkerPoolHandle,
};
pub use processor::{DEFAULT_MAX_ATTEMPTS, TaskOutcome, TaskProcessor};
