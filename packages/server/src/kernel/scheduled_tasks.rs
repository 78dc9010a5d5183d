//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The suite runs on a cron schedule inside the server process; each fire
//! is self-contained and an overlapping fire skips via the run lock.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::deps::Deps;
use crate::kernel::suite::run_suite;

/// Start the scheduler. Returns the handle so shutdown can stop it.
pub async fn start_scheduler(deps: Arc<Deps>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cron = deps.config.suite_cron.clone();
    let suite_deps = Arc::clone(&deps);
    let suite_job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let deps = Arc::clone(&suite_deps);
        Box::pin(async move {
            match run_suite(deps.as_ref()).await {
                Ok(report) => {
                    tracing::info!(
                        steps = report.steps.len(),
                        skipped = report.skipped.len(),
                        all_succeeded = report.all_succeeded(),
                        "scheduled suite run finished"
                    );
                }
                Err(e) => tracing::error!(error = %e, "scheduled suite run failed"),
            }
        })
    })?;

    scheduler.add(suite_job).await?;
    scheduler.start().await?;

    tracing::info!(cron = %deps.config.suite_cron, "scheduled tasks started");
    Ok(scheduler)
}
