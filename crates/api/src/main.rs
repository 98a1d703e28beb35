use anyhow::Context;

use jobgate_api::app::{build_app, services::build_services};
use jobgate_api::config::AppConfig;
use jobgate_api::cors::CorsPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobgate_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = build_services(&config).await?;

    let reconciler = config.reconcile.as_ref().map(|r| {
        tracing::info!(
            interval_secs = r.interval.as_secs(),
            stale_after_secs = r.stale_after.as_secs(),
            "reconciliation sweep enabled"
        );
        services.reconciler(r.stale_after).spawn(r.interval)
    });

    let queue = services.queue().clone();
    let cors = CorsPolicy::new(config.frontend_url.as_deref(), config.cors_strict);
    let app = build_app(services, cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = reconciler {
        handle.shutdown().await;
    }
    queue.close().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
