//! Factories turning a [`RelayConfig`](crate::config::RelayConfig) into wired components.
//!
//! The store handle is built once per process and passed to every
//! component explicitly.

use std::sync::Arc;

use tracing::{info, warn};

use hookrelay_core::{Delivery, RelayResult};

use crate::admission::{FixedWindowLimiter, NoOpLimiter, RateLimiter};
use crate::broker::{StoreBroker, TaskBroker};
use crate::config::{DeliveryConfig, RateLimitConfig, StoreConfig, WorkerConfig};
use crate::delivery::{HttpDelivery, SimulatedDelivery};
use crate::store::{InMemoryStore, SharedStore};

/// Store handle shared by every component of a process.
pub type DynStore = Arc<dyn SharedStore>;

/// Open the configured store. An unreachable server is a startup error.
pub fn build_store(config: &StoreConfig) -> RelayResult<DynStore> {
    if config.is_memory() {
        info!("using in-process store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    connect_redis(config)
}

#[cfg(feature = "redis")]
fn connect_redis(config: &StoreConfig) -> RelayResult<DynStore> {
    Ok(Arc::new(crate::store::RedisStore::connect_with_pool_size(
        &config.url,
        config.pool_size,
    )?))
}

#[cfg(not(feature = "redis"))]
fn connect_redis(_config: &StoreConfig) -> RelayResult<DynStore> {
    Err(hookrelay_core::RelayError::store(
        "redis support not compiled in; set REDIS_URL=memory or enable the `redis` feature",
    ))
}

pub fn build_limiter(store: &DynStore, config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    if !config.enabled {
        warn!("rate limiting disabled");
        return Arc::new(NoOpLimiter);
    }
    Arc::new(FixedWindowLimiter::new(
        store.clone(),
        config.limit,
        config.window,
    ))
}

pub fn build_broker(store: &DynStore, config: &WorkerConfig) -> Arc<StoreBroker<DynStore>> {
    Arc::new(StoreBroker::new(store.clone()).with_heartbeat(config.heartbeat))
}

/// Type-erased broker for callers that only enqueue.
pub fn build_task_broker(store: &DynStore, config: &WorkerConfig) -> Arc<dyn TaskBroker> {
    build_broker(store, config)
}

pub fn build_delivery(config: &DeliveryConfig) -> RelayResult<Arc<dyn Delivery>> {
    match &config.url {
        Some(url) => {
            info!(url = %url, timeout_ms = config.timeout.as_millis() as u64, "http delivery");
            Ok(Arc::new(HttpDelivery::new(url.clone(), config.timeout)?))
        }
        None => {
            warn!(
                failure_rate = config.simulated_failure_rate,
                "DELIVERY_URL not set; using simulated delivery"
            );
            Ok(Arc::new(SimulatedDelivery::new(
                SimulatedDelivery::DEFAULT_LATENCY,
                config.simulated_failure_rate,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::shutdown::ShutdownSignal;

    fn memory() -> DynStore {
        build_store(&StoreConfig {
            url: "memory".to_string(),
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn disabled_rate_limit_installs_noop() {
        let limiter = build_limiter(
            &memory(),
            &RateLimitConfig {
                enabled: false,
                limit: 1,
                window: Duration::from_secs(60),
            },
        );
        for _ in 0..10 {
            assert!(limiter.allow("u1").unwrap());
        }
    }

    #[test]
    fn enabled_rate_limit_counts_in_the_shared_store() {
        let store = memory();
        let config = RateLimitConfig {
            limit: 2,
            ..RateLimitConfig::default()
        };
        let a = build_limiter(&store, &config);
        let b = build_limiter(&store, &config);

        assert!(a.allow("u1").unwrap());
        assert!(b.allow("u1").unwrap());
        assert!(!a.allow("u1").unwrap());
    }

    #[test]
    fn brokers_on_one_store_share_the_queue() {
        let store = memory();
        let config = WorkerConfig {
            heartbeat: Duration::from_millis(20),
            ..WorkerConfig::default()
        };
        let producer = build_task_broker(&store, &config);
        let consumer = build_broker(&store, &config);

        producer.enqueue(hookrelay_core::Task::new("x")).unwrap();
        let task = consumer.dequeue(&ShutdownSignal::new()).unwrap().unwrap();
        assert_eq!(task.payload.as_bytes(), b"x");
    }

    #[test]
    fn missing_delivery_url_selects_simulation() {
        let delivery = build_delivery(&DeliveryConfig {
            simulated_failure_rate: 0.0,
            ..DeliveryConfig::default()
        });
        assert!(delivery.is_ok());
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn redis_url_without_feature_is_a_store_error() {
        use hookrelay_core::RelayError;

        assert!(matches!(
            build_store(&StoreConfig::default()),
            Err(RelayError::StoreUnavailable(_))
        ));
    }
}
