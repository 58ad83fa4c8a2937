//! Shared store primitives.
//!
//! Every component talks to the backing store through these six operations
//! and nothing else. Each operation is atomic on its own; no caller holds a
//! lock across a sequence of them.

use std::sync::Arc;
use std::time::Duration;

use hookrelay_core::RelayResult;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Store abstraction consumed by admission, broker and retry scheduler.
///
/// All failures are reported as `RelayError::StoreUnavailable`.
pub trait SharedStore: Send + Sync {
    /// Increment `key`, attaching `ttl` only when this call created it.
    /// Returns the post-increment count.
    fn incr_with_expiry(&self, key: &str, ttl: Duration) -> RelayResult<i64>;

    /// Append `value` to the tail of `list`.
    fn list_push(&self, list: &str, value: &str) -> RelayResult<()>;

    /// Pop the head of `list`, waiting up to `timeout` for one to appear.
    fn list_pop_blocking(&self, list: &str, timeout: Duration) -> RelayResult<Option<String>>;

    /// Add `member` to `set` with `score`, replacing the score if present.
    fn sorted_add(&self, set: &str, score: f64, member: &str) -> RelayResult<()>;

    /// Members with `score <= max_score`, lowest score first.
    fn sorted_range_to(&self, set: &str, max_score: f64) -> RelayResult<Vec<String>>;

    /// Remove `member`; returns whether it was present.
    fn sorted_remove(&self, set: &str, member: &str) -> RelayResult<bool>;
}

impl<S> SharedStore for Arc<S>
where
    S: SharedStore + ?Sized,
{
    fn incr_with_expiry(&self, key: &str, ttl: Duration) -> RelayResult<i64> {
        (**self).incr_with_expiry(key, ttl)
    }

    fn list_push(&self, list: &str, value: &str) -> RelayResult<()> {
        (**self).list_push(list, value)
    }

    fn list_pop_blocking(&self, list: &str, timeout: Duration) -> RelayResult<Option<String>> {
        (**self).list_pop_blocking(list, timeout)
    }

    fn sorted_add(&self, set: &str, score: f64, member: &str) -> RelayResult<()> {
        (**self).sorted_add(set, score, member)
    }

    fn sorted_range_to(&self, set: &str, max_score: f64) -> RelayResult<Vec<String>> {
        (**self).sorted_range_to(set, max_score)
    }

    fn sorted_remove(&self, set: &str, member: &str) -> RelayResult<bool> {
        (**self).sorted_remove(set, member)
    }
}
