//! In-memory shared store for tests/dev.
//!
//! Single-process only: state lives behind one mutex, and blocking pops park
//! on a condvar that every push wakes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hookrelay_core::{RelayError, RelayResult};

use super::SharedStore;

#[derive(Debug)]
struct Counter {
    value: i64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    counters: HashMap<String, Counter>,
    lists: HashMap<String, VecDeque<String>>,
    /// Kept sorted by (score, member), matching sorted-set iteration order.
    sorted: HashMap<String, Vec<(f64, String)>>,
}

/// In-memory [`SharedStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    list_ready: Condvar,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RelayResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RelayError::store("in-memory store lock poisoned"))
    }

    /// Number of values waiting in `list`.
    pub fn list_len(&self, list: &str) -> usize {
        self.lock()
            .map(|s| s.lists.get(list).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Number of live or not-yet-swept counters.
    pub fn counter_count(&self) -> usize {
        self.lock().map(|s| s.counters.len()).unwrap_or(0)
    }

    /// Number of members in `set`.
    pub fn sorted_len(&self, set: &str) -> usize {
        self.lock()
            .map(|s| s.sorted.get(set).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Score of `member`, if present.
    pub fn sorted_score(&self, set: &str, member: &str) -> Option<f64> {
        let state = self.lock().ok()?;
        state
            .sorted
            .get(set)?
            .iter()
            .find(|(_, m)| m == member)
            .map(|(score, _)| *score)
    }
}

impl SharedStore for InMemoryStore {
    fn incr_with_expiry(&self, key: &str, ttl: Duration) -> RelayResult<i64> {
        let now = Instant::now();
        let mut state = self.lock()?;

        match state.counters.get_mut(key) {
            Some(counter) if counter.expires_at > now => {
                counter.value += 1;
                Ok(counter.value)
            }
            _ => {
                // Absent or expired: this increment opens a new window.
                state.counters.retain(|_, c| c.expires_at > now);
                state.counters.insert(
                    key.to_string(),
                    Counter {
                        value: 1,
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }

    fn list_push(&self, list: &str, value: &str) -> RelayResult<()> {
        let mut state = self.lock()?;
        state
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
        drop(state);

        // Waiters may be parked on other lists; wake all of them.
        self.list_ready.notify_all();
        Ok(())
    }

    fn list_pop_blocking(&self, list: &str, timeout: Duration) -> RelayResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;

        loop {
            if let Some(value) = state.lists.get_mut(list).and_then(VecDeque::pop_front) {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .list_ready
                .wait_timeout(state, deadline - now)
                .map_err(|_| RelayError::store("in-memory store lock poisoned"))?;
            state = guard;
        }
    }

    fn sorted_add(&self, set: &str, score: f64, member: &str) -> RelayResult<()> {
        let mut state = self.lock()?;
        let entries = state.sorted.entry(set.to_string()).or_default();

        entries.retain(|(_, m)| m != member);
        let at = entries.partition_point(|(s, m)| {
            s.total_cmp(&score).then_with(|| m.as_str().cmp(member)).is_lt()
        });
        entries.insert(at, (score, member.to_string()));
        Ok(())
    }

    fn sorted_range_to(&self, set: &str, max_score: f64) -> RelayResult<Vec<String>> {
        let state = self.lock()?;
        Ok(state
            .sorted
            .get(set)
            .map(|entries| {
                entries
                    .iter()
                    .take_while(|(score, _)| *score <= max_score)
                    .map(|(_, member)| member.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn sorted_remove(&self, set: &str, member: &str) -> RelayResult<bool> {
        let mut state = self.lock()?;
        let Some(entries) = state.sorted.get_mut(set) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|(_, m)| m != member);
        Ok(entries.len() < before)
    }
}
