use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use hookrelay_core::RelayError;

use super::processor::{TaskOutcome, TaskProcessor};
use crate::broker::TaskBroker;
use crate::shutdown::ShutdownSignal;
use crate::store::SharedStore;

/// Default number of concurrent consumers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Default pause after a broker error before dequeuing again.
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub error_pause: Duration,
    /// Thread name prefix; workers are named `{name}-{index}`.
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            error_pause: DEFAULT_ERROR_PAUSE,
            name: "webhook-worker".to_string(),
        }
    }
}

/// Counters aggregated across all workers.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub received: u64,
    pub delivered: u64,
    pub retries_scheduled: u64,
    pub dropped: u64,
    pub discarded: u64,
    pub broker_errors: u64,
}

impl PoolStats {
    fn record_outcome(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Delivered => self.delivered += 1,
            TaskOutcome::RetryScheduled { .. } => self.retries_scheduled += 1,
            TaskOutcome::Dropped(_) => self.dropped += 1,
        }
    }
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: ShutdownSignal,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPoolHandle {
    /// Raise the shutdown signal and join every worker.
    ///
    /// Each worker finishes the task it is holding before exiting.
    pub fn stop(mut self) -> PoolStats {
        self.shutdown.trigger();
        for join in self.joins.drain(..) {
            if join.join().is_err() {
                error!("worker thread panicked");
            }
        }
        info!("worker pool stopped");
        snapshot(&self.stats)
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.joins.len()
    }

    pub fn stats(&self) -> PoolStats {
        snapshot(&self.stats)
    }
}

/// Competing-consumers pool over a [`TaskBroker`].
#[derive(Debug)]
pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `config.workers` threads sharing `broker` and `processor`.
    ///
    /// If a spawn fails, the already running workers are stopped before the
    /// error is returned.
    pub fn start<S>(
        config: WorkerPoolConfig,
        broker: Arc<dyn TaskBroker>,
        processor: Arc<TaskProcessor<S>>,
        shutdown: ShutdownSignal,
    ) -> std::io::Result<WorkerPoolHandle>
    where
        S: SharedStore + 'static,
    {
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let mut handle = WorkerPoolHandle {
            shutdown,
            joins: Vec::with_capacity(config.workers),
            stats,
        };

        for index in 0..config.workers {
            let worker = Worker {
                index,
                broker: broker.clone(),
                processor: processor.clone(),
                shutdown: handle.shutdown.clone(),
                error_pause: config.error_pause,
                stats: handle.stats.clone(),
            };

            match thread::Builder::new()
                .name(format!("{}-{index}", config.name))
                .spawn(move || worker.run())
            {
                Ok(join) => handle.joins.push(join),
                Err(e) => {
                    error!(worker = index, error = %e, "failed to spawn worker");
                    handle.stop();
                    return Err(e);
                }
            }
        }

        info!(workers = config.workers, "worker pool started");
        Ok(handle)
    }
}

struct Worker<S> {
    index: usize,
    broker: Arc<dyn TaskBroker>,
    processor: Arc<TaskProcessor<S>>,
    shutdown: ShutdownSignal,
    error_pause: Duration,
    stats: Arc<Mutex<PoolStats>>,
}

impl<S: SharedStore> Worker<S> {
    fn run(self) {
        info!(worker = self.index, "worker started");

        while !self.shutdown.is_triggered() {
            match self.broker.dequeue(&self.shutdown) {
                Ok(Some(task)) => {
                    self.record(|s| s.received += 1);
                    let outcome = self.processor.process(task);
                    self.record(|s| s.record_outcome(&outcome));
                }
                Ok(None) => {}
                Err(RelayError::Cancelled) => break,
                Err(RelayError::Serialization(reason)) => {
                    warn!(worker = self.index, %reason, "discarding malformed task");
                    self.record(|s| s.discarded += 1);
                }
                Err(e) => {
                    error!(worker = self.index, error = %e, "dequeue failed");
                    self.record(|s| s.broker_errors += 1);
                    if self.shutdown.wait_timeout(self.error_pause) {
                        break;
                    }
                }
            }
        }

        info!(worker = self.index, "worker stopped");
    }

    fn record(&self, f: impl FnOnce(&mut PoolStats)) {
        match self.stats.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn snapshot(stats: &Mutex<PoolStats>) -> PoolStats {
    match stats.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
