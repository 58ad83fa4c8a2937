//! Worker process: retry poller + competing-consumers pool.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use hookrelay_core::LoggingDeadLetterSink;
use hookrelay_infra::bootstrap;
use hookrelay_infra::config::RelayConfig;
use hookrelay_infra::scheduler::{RetryPoller, RetryScheduler};
use hookrelay_infra::shutdown::ShutdownSignal;
use hookrelay_infra::worker::{TaskProcessor, WorkerPool, WorkerPoolConfig};

fn main() -> anyhow::Result<()> {
    hookrelay_observability::init();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    if !config.store.is_memory() && config.store.pool_size as usize <= config.worker.count {
        warn!(
            pool_size = config.store.pool_size,
            workers = config.worker.count,
            "store pool is not larger than the worker count; workers will wait for connections"
        );
    }
    let store = bootstrap::build_store(&config.store)
        .context("could not initialize infrastructure")?;

    let broker = bootstrap::build_broker(&store, &config.worker);
    let scheduler = Arc::new(RetryScheduler::new(store.clone(), broker.clone()));
    let delivery = bootstrap::build_delivery(&config.delivery)?;
    let processor = Arc::new(
        TaskProcessor::new(
            scheduler.clone(),
            config.backoff.build(),
            delivery,
            Arc::new(LoggingDeadLetterSink),
        )
        .with_max_attempts(config.max_attempts),
    );

    let shutdown = ShutdownSignal::new();
    let poller = RetryPoller::spawn(scheduler, config.worker.poll_interval, shutdown.clone())
        .context("failed to spawn retry poller")?;

    let pool_config = WorkerPoolConfig {
        workers: config.worker.count,
        error_pause: config.worker.error_pause,
        ..WorkerPoolConfig::default()
    };
    let pool = match WorkerPool::start(pool_config, broker, processor, shutdown) {
        Ok(pool) => pool,
        Err(e) => {
            poller.stop();
            return Err(e).context("failed to start worker pool");
        }
    };

    info!(
        workers = config.worker.count,
        max_attempts = config.max_attempts,
        strategy = ?config.backoff.strategy,
        "worker running"
    );

    if let Err(e) = wait_for_shutdown() {
        warn!(error = %e, "signal handling failed; stopping");
    }

    info!("stopping workers");
    let stats = pool.stop();
    poller.stop();

    info!(
        received = stats.received,
        delivered = stats.delivered,
        retries_scheduled = stats.retries_scheduled,
        dropped = stats.dropped,
        discarded = stats.discarded,
        broker_errors = stats.broker_errors,
        "worker stopped"
    );
    Ok(())
}

/// Block the main thread until SIGINT or SIGTERM.
///
/// Workers run on plain threads; a single-threaded runtime is only used to
/// await the signals.
fn wait_for_shutdown() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut terminate = signal(SignalKind::terminate())?;
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                _ = terminate.recv() => {}
            }
        }

        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await?;

        info!("shutdown requested");
        Ok(())
    })
}
