//! Configuration loading and representation.
//!
//! Everything is read from environment variables; unset variables fall back
//! to the defaults below. Values are validated once at startup so that a bad
//! deployment fails before any thread is spawned.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use hookrelay_core::{BackoffConfig, BackoffStrategy};

use crate::broker::DEFAULT_HEARTBEAT;
use crate::delivery::DEFAULT_DELIVERY_TIMEOUT;
use crate::scheduler::DEFAULT_POLL_INTERVAL;
use crate::worker::{DEFAULT_ERROR_PAUSE, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKER_COUNT};

/// `REDIS_URL` value selecting the in-process store.
pub const MEMORY_STORE_URL: &str = "memory";

/// Default upper bound on pooled store connections per process.
pub const DEFAULT_POOL_SIZE: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: `{value}` ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `redis://...` or [`MEMORY_STORE_URL`].
    pub url: String,
    /// Ignored by the in-process store.
    pub pool_size: u32,
}

impl StoreConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_STORE_URL
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub limit: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub count: usize,
    pub heartbeat: Duration,
    pub poll_interval: Duration,
    pub error_pause: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_WORKER_COUNT,
            heartbeat: DEFAULT_HEARTBEAT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Webhook endpoint; `None` selects simulated delivery.
    pub url: Option<String>,
    pub timeout: Duration,
    pub simulated_failure_rate: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            simulated_failure_rate: 0.5,
        }
    }
}

/// Full process configuration shared by the api and worker binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub backoff: BackoffConfig,
    pub worker: WorkerConfig,
    pub delivery: DeliveryConfig,
    pub max_attempts: u32,
    pub api_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
            worker: WorkerConfig::default(),
            delivery: DeliveryConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            api_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let store_url = match env.get("REDIS_URL") {
            Some(url) => url,
            None => {
                let addr = env
                    .get("VALKEY_ADDR")
                    .unwrap_or_else(|| "localhost:6379".to_string());
                let db: u32 = env.parse("VALKEY_DB")?.unwrap_or(0);
                format!("redis://{addr}/{db}")
            }
        };

        let rate_limit = RateLimitConfig {
            enabled: env
                .parse_bool("RATE_LIMIT_ENABLED")?
                .unwrap_or(defaults.rate_limit.enabled),
            limit: env
                .parse("RATE_LIMIT_MAX")?
                .unwrap_or(defaults.rate_limit.limit),
            window: env
                .secs("RATE_LIMIT_WINDOW_SECS")?
                .unwrap_or(defaults.rate_limit.window),
        };

        let backoff = BackoffConfig {
            strategy: env
                .parse::<BackoffStrategy>("BACKOFF_STRATEGY")?
                .unwrap_or(defaults.backoff.strategy),
            base: env
                .millis("BACKOFF_BASE_MS")?
                .unwrap_or(defaults.backoff.base),
            factor: env
                .parse("BACKOFF_FACTOR")?
                .unwrap_or(defaults.backoff.factor),
            max: env
                .secs("BACKOFF_MAX_SECS")?
                .unwrap_or(defaults.backoff.max),
            jitter: env
                .parse("BACKOFF_JITTER")?
                .unwrap_or(defaults.backoff.jitter),
        };

        let worker = WorkerConfig {
            count: env.parse("WORKER_COUNT")?.unwrap_or(defaults.worker.count),
            heartbeat: env
                .millis("HEARTBEAT_MS")?
                .unwrap_or(defaults.worker.heartbeat),
            poll_interval: env
                .millis("POLL_INTERVAL_MS")?
                .unwrap_or(defaults.worker.poll_interval),
            error_pause: env
                .millis("ERROR_PAUSE_MS")?
                .unwrap_or(defaults.worker.error_pause),
        };

        let delivery = DeliveryConfig {
            url: env.get("DELIVERY_URL"),
            timeout: env
                .millis("DELIVERY_TIMEOUT_MS")?
                .unwrap_or(defaults.delivery.timeout),
            simulated_failure_rate: env
                .parse("SIMULATED_FAILURE_RATE")?
                .unwrap_or(defaults.delivery.simulated_failure_rate),
        };

        let config = Self {
            store: StoreConfig {
                url: store_url,
                pool_size: env
                    .parse("REDIS_POOL_SIZE")?
                    .unwrap_or(defaults.store.pool_size),
            },
            rate_limit,
            backoff,
            worker,
            delivery,
            max_attempts: env
                .parse("MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts),
            api_addr: env.get("API_ADDR").unwrap_or(defaults.api_addr),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let factor = self.backoff.factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::invalid(
                "BACKOFF_FACTOR",
                factor.to_string(),
                "must be a finite number >= 1.0",
            ));
        }
        let jitter = self.backoff.jitter;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::invalid(
                "BACKOFF_JITTER",
                jitter.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        let rate = self.delivery.simulated_failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::invalid(
                "SIMULATED_FAILURE_RATE",
                rate.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }
        if self.worker.count == 0 {
            return Err(ConfigError::invalid("WORKER_COUNT", "0", "at least one worker"));
        }
        if self.store.pool_size == 0 {
            return Err(ConfigError::invalid("REDIS_POOL_SIZE", "0", "at least one connection"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("MAX_ATTEMPTS", "0", "at least one attempt"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_WINDOW_SECS",
                "0",
                "window must be positive",
            ));
        }
        for (var, value) in [
            ("HEARTBEAT_MS", self.worker.heartbeat),
            ("POLL_INTERVAL_MS", self.worker.poll_interval),
            ("ERROR_PAUSE_MS", self.worker.error_pause),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(var, "0", "interval must be positive"));
            }
        }
        Ok(())
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::invalid(key, raw.clone(), e.to_string()))
            })
            .transpose()
    }

    fn parse_bool(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        self.get(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, raw.clone(), "expected true or false")),
            })
            .transpose()
    }

    fn millis(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn secs(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.store.url, "redis://localhost:6379/0");
        assert_eq!(config.store.pool_size, 16);
        assert_eq!(config.rate_limit.limit, 5);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.backoff.factor, 2.0);
        assert_eq!(config.backoff.max, Duration::from_secs(3600));
        assert_eq!(config.worker.count, 5);
        assert_eq!(config.max_attempts, 5);
        assert!(config.delivery.url.is_none());
    }

    #[test]
    fn valkey_address_and_db_build_the_url() {
        let config = load(&[("VALKEY_ADDR", "cache:6380"), ("VALKEY_DB", "3")]).unwrap();
        assert_eq!(config.store.url, "redis://cache:6380/3");
    }

    #[test]
    fn redis_url_wins_over_valkey_parts() {
        let config = load(&[("REDIS_URL", "memory"), ("VALKEY_ADDR", "cache:6380")]).unwrap();
        assert!(config.store.is_memory());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("RATE_LIMIT_ENABLED", "false"),
            ("RATE_LIMIT_MAX", "100"),
            ("BACKOFF_STRATEGY", "linear"),
            ("BACKOFF_BASE_MS", "250"),
            ("BACKOFF_JITTER", "0.2"),
            ("WORKER_COUNT", "12"),
            ("MAX_ATTEMPTS", "8"),
            ("HEARTBEAT_MS", "200"),
            ("DELIVERY_URL", "https://hooks.example.com/in"),
            ("API_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.limit, 100);
        assert_eq!(config.backoff.strategy, BackoffStrategy::Linear);
        assert_eq!(config.backoff.base, Duration::from_millis(250));
        assert_eq!(config.backoff.jitter, 0.2);
        assert_eq!(config.worker.count, 12);
        assert_eq!(config.worker.heartbeat, Duration::from_millis(200));
        assert_eq!(config.max_attempts, 8);
        assert_eq!(
            config.delivery.url.as_deref(),
            Some("https://hooks.example.com/in")
        );
        assert_eq!(config.api_addr, "127.0.0.1:9000");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("WORKER_COUNT", "  "), ("DELIVERY_URL", "")]).unwrap();
        assert_eq!(config.worker.count, 5);
        assert!(config.delivery.url.is_none());
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = load(&[("RATE_LIMIT_MAX", "five")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "RATE_LIMIT_MAX", .. }));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        for (var, value) in [
            ("BACKOFF_FACTOR", "0.5"),
            ("BACKOFF_JITTER", "1.5"),
            ("SIMULATED_FAILURE_RATE", "2"),
            ("WORKER_COUNT", "0"),
            ("MAX_ATTEMPTS", "0"),
            ("RATE_LIMIT_WINDOW_SECS", "0"),
            ("HEARTBEAT_MS", "0"),
            ("POLL_INTERVAL_MS", "0"),
            ("ERROR_PAUSE_MS", "0"),
            ("REDIS_POOL_SIZE", "0"),
            ("BACKOFF_STRATEGY", "random"),
            ("RATE_LIMIT_ENABLED", "maybe"),
        ] {
            let err = load(&[(var, value)]).unwrap_err();
            let ConfigError::Invalid { var: reported, .. } = err;
            assert_eq!(reported, var);
        }
    }
}
