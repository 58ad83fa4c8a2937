//! Service wiring for the ingress.

use std::sync::Arc;

use tracing::info;

use hookrelay_core::RelayResult;
use hookrelay_infra::admission::RateLimiter;
use hookrelay_infra::bootstrap;
use hookrelay_infra::broker::TaskBroker;
use hookrelay_infra::config::RelayConfig;
use hookrelay_infra::submit::Submitter;

/// Everything the handlers need, shared via `Extension`.
#[derive(Clone)]
pub struct AppServices {
    pub submitter: Submitter,
}

impl AppServices {
    pub fn new(limiter: Arc<dyn RateLimiter>, broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            submitter: Submitter::new(limiter, broker),
        }
    }
}

/// Connect to the configured store and wire limiter and broker on top of it.
///
/// Blocking: run it outside the async runtime or via `spawn_blocking`.
pub fn build_services(config: &RelayConfig) -> RelayResult<AppServices> {
    let store = bootstrap::build_store(&config.store)?;
    let limiter = bootstrap::build_limiter(&store, &config.rate_limit);
    let broker = bootstrap::build_task_broker(&store, &config.worker);

    info!(
        rate_limit_enabled = config.rate_limit.enabled,
        limit = config.rate_limit.limit,
        window_secs = config.rate_limit.window.as_secs(),
        "ingress services ready"
    );
    Ok(AppServices::new(limiter, broker))
}
