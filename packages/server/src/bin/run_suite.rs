// One-shot suite runner for external cron.

use anyhow::{Context, Result};
use automation_core::config::Config;
use automation_core::kernel::deps::Deps;
use automation_core::kernel::suite::run_suite;
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
    let deps = Deps::production(config);

    let report = run_suite(deps.as_ref()).await?;
    for (name, outcome) in &report.steps {
        tracing::info!(
            step = name,
            success = outcome.success,
            duration_s = outcome.duration_seconds,
            "{}",
            outcome.message
        );
    }
    for name in &report.skipped {
        tracing::info!(step = name, "skipped (disabled)");
    }
    Ok(())
}
