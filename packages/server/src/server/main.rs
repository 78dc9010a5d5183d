// Main entry point: webhook HTTP service + in-process cron suite.

use anyhow::{Context, Result};
use automation_core::config::Config;
use automation_core::kernel::deps::Deps;
use automation_core::kernel::scheduled_tasks::start_scheduler;
use automation_core::kernel::webhook_queue::{WebhookQueue, run_workers};
use automation_core::server::app::build_app;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,automation_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(environment = ?config.environment, "configuration loaded");

    let deps = Deps::production(config);
    let cancel = CancellationToken::new();

    let (queue, rx) = WebhookQueue::new(
        deps.config.webhook_queue_capacity,
        deps.config.webhook_overflow_path(),
    );
    let workers = tokio::spawn(run_workers(
        rx,
        deps.config.webhook_workers,
        Arc::clone(&deps.store),
        deps.config.webhook_overflow_path(),
        cancel.clone(),
    ));

    let mut scheduler = start_scheduler(Arc::clone(&deps))
        .await
        .context("Failed to start scheduler")?;

    let app = build_app(Arc::clone(&deps), queue);
    let addr = format!("0.0.0.0:{}", deps.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "webhook service listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // Drain: stop cron first, then let workers finish the queue.
    scheduler.shutdown().await.ok();
    cancel.cancel();
    let _ = workers.await;
    tracing::info!("shutdown complete");
    Ok(())
}
