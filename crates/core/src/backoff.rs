//! Retry backoff policies.
//!
//! A policy maps the number of failed attempts *before* the current failure
//! to the delay until the next attempt: the first retry asks for
//! `next_interval(0)`. Policies are pure and infallible; which one runs is
//! decided once, when [`BackoffConfig::build`] is called.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay calculation for retries.
pub trait BackoffPolicy: Debug + Send + Sync {
    fn next_interval(&self, attempt_count: u32) -> Duration;
}

impl<P: BackoffPolicy + ?Sized> BackoffPolicy for Arc<P> {
    fn next_interval(&self, attempt_count: u32) -> Duration {
        (**self).next_interval(attempt_count)
    }
}

impl<P: BackoffPolicy + ?Sized> BackoffPolicy for Box<P> {
    fn next_interval(&self, attempt_count: u32) -> Duration {
        (**self).next_interval(attempt_count)
    }
}

/// `base * factor^attempt_count`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        Self { base, factor, max }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_interval(&self, attempt_count: u32) -> Duration {
        let exp = i32::try_from(attempt_count).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.factor.powi(exp);

        // Overflow shows up as inf/NaN; both saturate.
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs.max(0.0)).min(self.max)
    }
}

/// `base * (attempt_count + 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy for LinearBackoff {
    fn next_interval(&self, attempt_count: u32) -> Duration {
        self.base
            .checked_mul(attempt_count.saturating_add(1))
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Same delay for every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub delay: Duration,
}

impl BackoffPolicy for FixedBackoff {
    fn next_interval(&self, _attempt_count: u32) -> Duration {
        self.delay
    }
}

/// Scales an inner policy by a random factor in `[1 - jitter, 1]`.
///
/// Never longer than the inner interval, so the inner cap still holds.
#[derive(Debug)]
pub struct JitteredBackoff<P> {
    inner: P,
    jitter: f64,
}

impl<P: BackoffPolicy> JitteredBackoff<P> {
    pub fn new(inner: P, jitter: f64) -> Self {
        Self {
            inner,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }
}

impl<P: BackoffPolicy> BackoffPolicy for JitteredBackoff<P> {
    fn next_interval(&self, attempt_count: u32) -> Duration {
        let interval = self.inner.next_interval(attempt_count);
        if self.jitter == 0.0 {
            return interval;
        }
        let scale = 1.0 - self.jitter * rand::thread_rng().gen_range(0.0..=1.0);
        interval.mul_f64(scale)
    }
}

/// Backoff strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// base * factor^attempt
    #[default]
    Exponential,
    /// base * (attempt + 1)
    Linear,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            other => Err(format!(
                "unknown backoff strategy `{other}` (expected fixed, exponential or linear)"
            )),
        }
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    /// Delay of the first retry.
    pub base: Duration,
    /// Growth factor (exponential only).
    pub factor: f64,
    /// Upper bound for any delay.
    pub max: Duration,
    /// 0.0 disables jitter.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(60 * 60),
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Build the configured policy.
    pub fn build(&self) -> Arc<dyn BackoffPolicy> {
        let policy: Arc<dyn BackoffPolicy> = match self.strategy {
            BackoffStrategy::Fixed => Arc::new(FixedBackoff {
                delay: self.base.min(self.max),
            }),
            BackoffStrategy::Exponential => {
                Arc::new(ExponentialBackoff::new(self.base, self.factor, self.max))
            }
            BackoffStrategy::Linear => Arc::new(LinearBackoff {
                base: self.base,
                max: self.max,
            }),
        };

        if self.jitter > 0.0 {
            Arc::new(JitteredBackoff::new(policy, self.jitter))
        } else {
            policy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential() -> ExponentialBackoff {
        ExponentialBackoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(3600))
    }

    #[test]
    fn exponential_doubles_from_base() {
        let policy = exponential();
        assert_eq!(policy.next_interval(0), Duration::from_secs(1));
        assert_eq!(policy.next_interval(1), Duration::from_secs(2));
        assert_eq!(policy.next_interval(2), Duration::from_secs(4));
        assert_eq!(policy.next_interval(3), Duration::from_secs(8));
    }

    #[test]
    fn exponential_caps_at_max() {
        let policy = exponential();
        // 2^12 = 4096s > 1h
        assert_eq!(policy.next_interval(12), Duration::from_secs(3600));
    }

    #[test]
    fn exponential_saturates_instead_of_overflowing() {
        let policy = exponential();
        assert_eq!(policy.next_interval(5_000), Duration::from_secs(3600));
        assert_eq!(policy.next_interval(u32::MAX), Duration::from_secs(3600));
    }

    #[test]
    fn linear_grows_by_base() {
        let policy = LinearBackoff {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
        };
        assert_eq!(policy.next_interval(0), Duration::from_millis(100));
        assert_eq!(policy.next_interval(1), Duration::from_millis(200));
        assert_eq!(policy.next_interval(2), Duration::from_millis(300));
        assert_eq!(policy.next_interval(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn fixed_is_constant() {
        let policy = FixedBackoff {
            delay: Duration::from_millis(500),
        };
        assert_eq!(policy.next_interval(0), Duration::from_millis(500));
        assert_eq!(policy.next_interval(9), Duration::from_millis(500));
    }

    #[test]
    fn jitter_never_exceeds_inner_interval() {
        let policy = JitteredBackoff::new(exponential(), 0.5);
        for attempt in 0..20 {
            let inner = exponential().next_interval(attempt);
            let jittered = policy.next_interval(attempt);
            assert!(jittered <= inner);
            assert!(jittered >= inner.mul_f64(0.5) - Duration::from_nanos(1));
        }
    }

    #[test]
    fn config_builds_selected_strategy() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Linear,
            base: Duration::from_secs(2),
            ..Default::default()
        };
        let policy = config.build();
        assert_eq!(policy.next_interval(2), Duration::from_secs(6));

        let policy = BackoffConfig::default().build();
        assert_eq!(policy.next_interval(2), Duration::from_secs(4));
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Linear".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Linear));
        assert_eq!(" fixed ".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Fixed));
        assert!("random".parse::<BackoffStrategy>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn exponential_is_monotonic_and_bounded(
                base_ms in 1u64..10_000,
                factor in 1.1f64..4.0,
                max_secs in 1u64..100_000,
                attempt in 0u32..10_000,
            ) {
                let policy = ExponentialBackoff::new(
                    Duration::from_millis(base_ms),
                    factor,
                    Duration::from_secs(max_secs),
                );
                let current = policy.next_interval(attempt);
                let next = policy.next_interval(attempt + 1);
                prop_assert!(current <= next);
                prop_assert!(next <= Duration::from_secs(max_secs));
            }

            #[test]
            fn linear_is_monotonic_and_bounded(
                base_ms in 0u64..10_000,
                max_secs in 0u64..100_000,
                attempt in any::<u32>(),
            ) {
                let policy = LinearBackoff {
                    base: Duration::from_millis(base_ms),
                    max: Duration::from_secs(max_secs),
                };
                let current = policy.next_interval(attempt);
                let next = policy.next_interval(attempt.saturating_add(1));
                prop_assert!(current <= next);
                prop_assert!(next <= Duration::from_secs(max_secs));
            }
        }
    }
}
