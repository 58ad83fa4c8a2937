//! Admission control (per-identity rate limiting).
//!
//! ## Strategies
//!
//! - [`FixedWindowLimiter`]: counting window in the shared store. Each
//!   identity's window opens on its first request and lasts `window`; bursts
//!   straddling a window boundary are allowed.
//! - [`NoOpLimiter`]: always admits (trusted callers, local development).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use hookrelay_core::RelayResult;

use crate::store::SharedStore;

/// Key prefix for per-identity counters.
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Decides whether a request from `identity` may proceed.
///
/// Store failures are returned as errors; the caller decides whether to fail
/// open or closed.
pub trait RateLimiter: Send + Sync {
    fn allow(&self, identity: &str) -> RelayResult<bool>;
}

impl<L: RateLimiter + ?Sized> RateLimiter for Arc<L> {
    fn allow(&self, identity: &str) -> RelayResult<bool> {
        (**self).allow(identity)
    }
}

/// Fixed-window counter limiter.
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter<S> {
    store: S,
    limit: u64,
    window: Duration,
}

impl<S: SharedStore> FixedWindowLimiter<S> {
    pub fn new(store: S, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl<S: SharedStore> RateLimiter for FixedWindowLimiter<S> {
    fn allow(&self, identity: &str) -> RelayResult<bool> {
        let key = format!("{RATE_LIMIT_KEY_PREFIX}{identity}");
        let count = self.store.incr_with_expiry(&key, self.window)?;

        let allowed = u64::try_from(count).map_or(true, |c| c <= self.limit);
        if !allowed {
            debug!(identity, count, limit = self.limit, "rate limit exceeded");
        }
        Ok(allowed)
    }
}

/// Limiter that admits everything and touches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLimiter;

impl RateLimiter for NoOpLimiter {
    fn allow(&self, _identity: &str) -> RelayResult<bool> {
        Ok(true)
    }
}
