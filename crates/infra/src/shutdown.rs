//! Cooperative shutdown signal shared by workers and the retry poller.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    triggered: Mutex<bool>,
    changed: Condvar,
}

/// Cloneable, one-way cancellation flag.
///
/// Loops check [`ShutdownSignal::is_triggered`] at iteration boundaries and
/// use [`ShutdownSignal::wait_timeout`] instead of `thread::sleep` so pauses
/// end as soon as shutdown is requested.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter. Idempotent.
    pub fn trigger(&self) {
        let mut triggered = match self.inner.triggered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *triggered = true;
        self.inner.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        match self.inner.triggered.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleep up to `timeout`, returning early if the signal fires.
    ///
    /// Returns `true` when the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = match self.inner.triggered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = match self.inner.changed.wait_timeout(triggered, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn starts_untriggered_and_latches() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
        assert!(signal.clone().is_triggered());
    }

    #[test]
    fn wait_times_out_without_trigger() {
        let signal = ShutdownSignal::new();
        let started = Instant::now();

        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn trigger_wakes_waiters_early() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let woke = signal.wait_timeout(Duration::from_secs(10));
                (woke, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (woke, elapsed) = waiter.join().unwrap();
        assert!(woke);
        assert!(elapsed < Duration::from_secs(5));
    }
}
