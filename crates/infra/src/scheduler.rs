//! Retry scheduler: time-ordered holding area for failed tasks.
//!
//! Entries live in a sorted set scored by their due time (unix millis). A
//! poller sweeps due entries back onto the broker on a fixed tick.
//!
//! The sweep reads, re-enqueues, then removes. Those are separate store
//! operations, so two schedulers racing on the same set may both promote an
//! entry before either removes it. Delivery is at-least-once; the duplicate
//! is tolerated.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use hookrelay_core::{RelayError, RelayResult, Task};

use crate::broker::TaskBroker;
use crate::shutdown::ShutdownSignal;
use crate::store::SharedStore;

/// Default sorted-set key for retry entries.
pub const DEFAULT_SCHEDULE_KEY: &str = "retry_schedule";

/// Default sweep interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PollReport {
    /// Entries moved back onto the broker.
    pub promoted: usize,
    /// Malformed entries removed without promotion.
    pub discarded: usize,
}

/// Delayed re-delivery over a [`SharedStore`] sorted set.
pub struct RetryScheduler<S> {
    store: S,
    broker: Arc<dyn TaskBroker>,
    schedule_key: String,
}

impl<S: SharedStore> RetryScheduler<S> {
    pub fn new(store: S, broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            store,
            broker,
            schedule_key: DEFAULT_SCHEDULE_KEY.to_string(),
        }
    }

    pub fn with_schedule_key(mut self, key: impl Into<String>) -> Self {
        self.schedule_key = key.into();
        self
    }

    pub fn schedule_key(&self) -> &str {
        &self.schedule_key
    }

    /// Hold `task` until `now + delay`.
    ///
    /// The task is stored as-is; its `attempt_count` travels inside the entry.
    pub fn schedule(&self, task: &Task, delay: Duration) -> RelayResult<()> {
        let encoded = task.encode()?;
        let execute_at = now_millis() + delay.as_secs_f64() * 1000.0;

        self.store.sorted_add(&self.schedule_key, execute_at, &encoded)?;
        debug!(
            attempt_count = task.attempt_count,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        Ok(())
    }

    /// Move every due entry back onto the broker.
    ///
    /// Entries are handled one at a time. A store failure stops the sweep and
    /// is returned; entries already promoted stay promoted, the rest are
    /// picked up by the next sweep. A malformed entry is removed and counted
    /// as discarded.
    pub fn poll(&self) -> RelayResult<PollReport> {
        let due = self.store.sorted_range_to(&self.schedule_key, now_millis())?;
        let mut report = PollReport::default();

        for member in due {
            match Task::decode(&member) {
                Ok(task) => {
                    let attempt_count = task.attempt_count;
                    self.broker.enqueue(task)?;
                    self.store.sorted_remove(&self.schedule_key, &member)?;
                    report.promoted += 1;
                    debug!(attempt_count, "retry promoted to queue");
                }
                Err(RelayError::Serialization(reason)) => {
                    warn!(%reason, "discarding malformed retry entry");
                    self.store.sorted_remove(&self.schedule_key, &member)?;
                    report.discarded += 1;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(report)
    }
}

/// Current unix time in fractional milliseconds.
fn now_millis() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Handle to stop and join the poller thread.
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: ShutdownSignal,
    join: Option<thread::JoinHandle<()>>,
}

impl PollerHandle {
    /// Signal the poller and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background sweep loop driving [`RetryScheduler::poll`].
#[derive(Debug)]
pub struct RetryPoller;

impl RetryPoller {
    /// Spawn a thread that polls every `interval` until `shutdown` is raised.
    ///
    /// Sweep errors are logged and retried on the next tick.
    pub fn spawn<S>(
        scheduler: Arc<RetryScheduler<S>>,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> std::io::Result<PollerHandle>
    where
        S: SharedStore + 'static,
    {
        let signal = shutdown.clone();
        let join = thread::Builder::new()
            .name("retry-poller".to_string())
            .spawn(move || poller_loop(&scheduler, interval, &signal))?;

        Ok(PollerHandle {
            shutdown,
            join: Some(join),
        })
    }
}

fn poller_loop<S: SharedStore>(
    scheduler: &RetryScheduler<S>,
    interval: Duration,
    shutdown: &ShutdownSignal,
) {
    info!(interval_ms = interval.as_millis() as u64, "retry poller started");

    while !shutdown.wait_timeout(interval) {
        match scheduler.poll() {
            Ok(report) if report.promoted > 0 || report.discarded > 0 => {
                info!(
                    promoted = report.promoted,
                    discarded = report.discarded,
                    "retry sweep"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "retry sweep failed"),
        }
    }

    info!("retry poller stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::broker::StoreBroker;
    use crate::store::InMemoryStore;

    fn setup() -> (
        Arc<InMemoryStore>,
        Arc<StoreBroker<Arc<InMemoryStore>>>,
        RetryScheduler<Arc<InMemoryStore>>,
    ) {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(
            StoreBroker::new(store.clone()).with_heartbeat(Duration::from_millis(10)),
        );
        let scheduler = RetryScheduler::new(store.clone(), broker.clone());
        (store, broker, scheduler)
    }

    /// Broker whose enqueue fails after `ok` successes.
    struct FailingBroker {
        ok: usize,
        calls: AtomicUsize,
        inner: Arc<StoreBroker<Arc<InMemoryStore>>>,
    }

    impl TaskBroker for FailingBroker {
        fn enqueue(&self, task: Task) -> RelayResult<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok {
                return Err(RelayError::store("connection reset"));
            }
            self.inner.enqueue(task)
        }

        fn dequeue(&self, shutdown: &ShutdownSignal) -> RelayResult<Option<Task>> {
            self.inner.dequeue(shutdown)
        }
    }

    #[test]
    fn entry_is_not_promoted_before_its_delay() {
        let (store, _broker, scheduler) = setup();
        scheduler
            .schedule(&Task::new("later"), Duration::from_millis(200))
            .unwrap();

        let report = scheduler.poll().unwrap();

        assert_eq!(report.promoted, 0);
        assert_eq!(store.list_len("webhook_queue"), 0);
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 1);
    }

    #[test]
    fn due_entry_is_promoted_and_removed() {
        let (store, broker, scheduler) = setup();
        let task = Task::new("retry me").with_attempt_count(3);
        scheduler.schedule(&task, Duration::from_millis(30)).unwrap();

        thread::sleep(Duration::from_millis(50));
        let report = scheduler.poll().unwrap();

        assert_eq!(report.promoted, 1);
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 0);
        let promoted = broker.dequeue(&ShutdownSignal::new()).unwrap().unwrap();
        assert_eq!(promoted.payload, task.payload);
        assert_eq!(promoted.attempt_count, 3);
    }

    #[test]
    fn score_is_now_plus_delay() {
        let (store, _broker, scheduler) = setup();
        let task = Task::new("x");
        let before = now_millis();

        scheduler.schedule(&task, Duration::from_secs(4)).unwrap();

        let score = store
            .sorted_score(DEFAULT_SCHEDULE_KEY, &task.encode().unwrap())
            .unwrap();
        assert!(score >= before + 4000.0);
        assert!(score <= now_millis() + 4000.0);
    }

    #[test]
    fn only_due_entries_are_promoted() {
        let (store, _broker, scheduler) = setup();
        scheduler.schedule(&Task::new("now"), Duration::ZERO).unwrap();
        scheduler
            .schedule(&Task::new("later"), Duration::from_secs(60))
            .unwrap();

        let report = scheduler.poll().unwrap();

        assert_eq!(report.promoted, 1);
        assert_eq!(store.list_len("webhook_queue"), 1);
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 1);
    }

    #[test]
    fn malformed_entry_is_discarded() {
        let (store, _broker, scheduler) = setup();
        store.sorted_add(DEFAULT_SCHEDULE_KEY, 0.0, "garbage").unwrap();
        scheduler.schedule(&Task::new("ok"), Duration::ZERO).unwrap();

        let report = scheduler.poll().unwrap();

        assert_eq!(report, PollReport { promoted: 1, discarded: 1 });
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 0);
    }

    #[test]
    fn requeue_failure_keeps_remaining_entries_for_next_sweep() {
        let store = Arc::new(InMemoryStore::new());
        let inner = Arc::new(StoreBroker::new(store.clone()));
        let broker = Arc::new(FailingBroker {
            ok: 1,
            calls: AtomicUsize::new(0),
            inner,
        });
        let scheduler = RetryScheduler::new(store.clone(), broker);
        scheduler.schedule(&Task::new("a"), Duration::ZERO).unwrap();
        scheduler.schedule(&Task::new("b"), Duration::ZERO).unwrap();

        assert!(matches!(scheduler.poll(), Err(RelayError::StoreUnavailable(_))));
        assert_eq!(store.list_len("webhook_queue"), 1);
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 1);
    }

    #[test]
    fn racing_sweeps_may_duplicate_but_never_lose() {
        let (store, _broker, scheduler) = setup();
        let task = Task::new("dup");
        scheduler.schedule(&task, Duration::ZERO).unwrap();

        // Second scheduler reads the entry before the first removes it.
        let member = task.encode().unwrap();
        let due = store.sorted_range_to(DEFAULT_SCHEDULE_KEY, now_millis()).unwrap();
        assert_eq!(due, vec![member]);
        scheduler.poll().unwrap();
        let racer = StoreBroker::new(store.clone());
        racer.enqueue(Task::decode(&due[0]).unwrap()).unwrap();

        assert_eq!(store.list_len("webhook_queue"), 2);
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 0);
    }

    #[test]
    fn poller_promotes_within_one_tick() {
        let (store, broker, scheduler) = setup();
        let scheduler = Arc::new(scheduler);
        let shutdown = ShutdownSignal::new();
        let tick = Duration::from_millis(20);
        let delay = Duration::from_millis(60);
        let handle = RetryPoller::spawn(scheduler.clone(), tick, shutdown.clone()).unwrap();

        let scheduled_at = Instant::now();
        scheduler.schedule(&Task::new("tick"), delay).unwrap();

        let task = loop {
            if let Some(task) = broker.dequeue(&ShutdownSignal::new()).unwrap() {
                break task;
            }
            assert!(scheduled_at.elapsed() < Duration::from_secs(2), "never promoted");
        };
        let waited = scheduled_at.elapsed();

        assert_eq!(task.payload.as_bytes(), b"tick");
        assert!(waited >= delay - Duration::from_millis(1));
        // One tick after the due time, plus scheduling slack.
        assert!(
            waited < delay + tick + Duration::from_millis(220),
            "promoted after {waited:?}"
        );
        assert_eq!(store.sorted_len(DEFAULT_SCHEDULE_KEY), 0);
        handle.stop();
    }

    #[test]
    fn poller_stops_promptly() {
        let (_store, _broker, scheduler) = setup();
        let handle = RetryPoller::spawn(
            Arc::new(scheduler),
            Duration::from_secs(30),
            ShutdownSignal::new(),
        )
        .unwrap();

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
