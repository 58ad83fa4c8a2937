use std::sync::Arc;

use anyhow::Context;

use hookrelay_api::app::{build_app, services};
use hookrelay_infra::config::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hookrelay_observability::init();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    let addr = config.api_addr.clone();

    let services = tokio::task::spawn_blocking(move || services::build_services(&config))
        .await?
        .context("could not initialize infrastructure")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
}
