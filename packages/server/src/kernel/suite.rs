//! The orchestrator: runs the automation steps in a fixed sequence,
//! consulting the `Automations` table before each and writing outcomes
//! back. A step failure never aborts the suite.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::domains::reservations::ingest::csv::ingest_csv_directory;
use crate::domains::reservations::ingest::feeds::{FEEDS_TABLE, fetch_all, load_feeds};
use crate::domains::reservations::models::property::{PROPERTIES_TABLE, PropertyResolver};
use crate::domains::reservations::projector::Projector;
use crate::domains::reservations::reconciler::Reconciler;
use crate::domains::reservations::session::SessionTracker;
use crate::kernel::automations::{AutomationGate, StepOutcome};
use crate::kernel::deps::Deps;
use crate::kernel::traits::RecordGateway;

pub const STEP_CSV: &str = "CSV Ingest";
pub const STEP_CALENDAR: &str = "Calendar Ingest";
pub const STEP_RECONCILE: &str = "Reconciler";
pub const STEP_PROJECTION: &str = "Job Projection";
pub const STEP_SYNC: &str = "Sync Verification";
pub const STEP_SERVICE_LINES: &str = "Service Line Reconciliation";

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
    pub skipped: Vec<&'static str>,
}

impl SuiteReport {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|(_, o)| o.success)
    }
}

/// Run the whole suite once. Returns an error only for run-level problems
/// (another run in progress, prerequisites unreachable, wall cap hit);
/// step failures are contained in the report.
pub async fn run_suite(deps: &Deps) -> Result<SuiteReport> {
    let Ok(_guard) = deps.run_lock.try_lock() else {
        anyhow::bail!("previous suite run still in progress, skipping");
    };

    let cap = Duration::from_secs(deps.config.run_timeout_seconds);
    match tokio::time::timeout(cap, run_suite_inner(deps)).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("suite exceeded wall cap of {}s", cap.as_secs()),
    }
}

async fn run_suite_inner(deps: &Deps) -> Result<SuiteReport> {
    let config = &deps.config;
    let store = deps.store.as_ref();
    let now = Utc::now();

    let properties = store
        .list_all(PROPERTIES_TABLE)
        .await
        .context("loading properties")?;
    let resolver = PropertyResolver::from_records(&properties);
    info!(properties = resolver.len(), "suite starting");

    let gate = AutomationGate::new(store);
    let reconciler = Reconciler::new(store, config);
    let projector = Projector::new(store, deps.field_service.as_ref(), config);
    let mut session = SessionTracker::new();
    let mut report = SuiteReport::default();

    // CSV ingest
    if step_enabled(&gate, STEP_CSV).await {
        let started = Instant::now();
        let result = match ingest_csv_directory(config, &resolver, &reconciler, &mut session, now)
            .await
        {
            Ok(stats) => Ok((
                format!(
                    "{} files processed, {} events ({} rows skipped)",
                    stats.files_processed,
                    stats.events_produced,
                    stats.rows_outside_window + stats.rows_unmatched_property + stats.rows_invalid
                ),
                json!({
                    "files_processed": stats.files_processed,
                    "files_failed": stats.files_failed,
                    "rows_seen": stats.rows_seen,
                    "events": stats.events_produced,
                    "outside_window": stats.rows_outside_window,
                    "unmatched_property": stats.rows_unmatched_property,
                    "invalid": stats.rows_invalid,
                    "created": stats.created,
                    "modified": stats.modified,
                    "removed": stats.removed,
                }),
            )),
            Err(e) => Err(e),
        };
        finish_step(&gate, &mut report, STEP_CSV, started, result).await;
    } else {
        report.skipped.push(STEP_CSV);
    }

    // Calendar ingest
    if step_enabled(&gate, STEP_CALENDAR).await {
        let started = Instant::now();
        let result = async {
            let feed_records = store.list_all(FEEDS_TABLE).await.context("loading feeds")?;
            let feeds = load_feeds(&feed_records);
            let http = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.feed_timeout_seconds))
                .build()
                .context("building feed client")?;
            let (fetches, stats) = fetch_all(&http, feeds, config, now).await;

            let mut reconcile = crate::domains::reservations::reconciler::ReconcileStats::default();
            for fetch in &fetches {
                if let Ok(events) = &fetch.outcome {
                    let run = reconciler.apply_events(events, &mut session, now).await;
                    reconcile.merge(&run);
                    session.mark_feed_complete(&fetch.feed.url);
                }
            }
            Ok((
                format!(
                    "{}/{} feeds, {} events, {} duplicates ignored",
                    stats.feeds_succeeded,
                    stats.feeds_attempted,
                    stats.events_produced,
                    reconcile.duplicates_ignored
                ),
                json!({
                    "feeds_attempted": stats.feeds_attempted,
                    "feeds_succeeded": stats.feeds_succeeded,
                    "feeds_failed": stats.feeds_failed,
                    "events_seen": stats.events_seen,
                    "events_dropped": stats.events_dropped,
                    "created": reconcile.created,
                    "modified": reconcile.modified,
                    "unchanged": reconcile.unchanged,
                    "duplicates_ignored": reconcile.duplicates_ignored,
                }),
            ))
        }
        .await;
        finish_step(&gate, &mut report, STEP_CALENDAR, started, result).await;
    } else {
        report.skipped.push(STEP_CALENDAR);
    }

    // Reconciler flush: removal sweep + flag recomputation
    if step_enabled(&gate, STEP_RECONCILE).await {
        let started = Instant::now();
        let result = async {
            let removals = reconciler.sweep_removals(&session, now).await?;
            let flags = reconciler.recompute_flags(now).await?;
            Ok((
                format!(
                    "{} removed ({} rescued, {} deferred), {} flags updated",
                    removals.removed, removals.rescued, removals.deferred, flags.updated
                ),
                json!({
                    "removal_candidates": removals.candidates,
                    "removed": removals.removed,
                    "rescued": removals.rescued,
                    "deferred": removals.deferred,
                    "counters_reset": removals.counters_reset,
                    "flags_examined": flags.examined,
                    "flags_updated": flags.updated,
                }),
            ))
        }
        .await;
        finish_step(&gate, &mut report, STEP_RECONCILE, started, result).await;
    } else {
        report.skipped.push(STEP_RECONCILE);
    }

    // Job projection
    if step_enabled(&gate, STEP_PROJECTION).await {
        let started = Instant::now();
        let result = match projector.project_jobs(&resolver, now).await {
            Ok(stats) => Ok((
                format!(
                    "{} jobs created of {} candidates",
                    stats.jobs_created, stats.examined
                ),
                json!({
                    "examined": stats.examined,
                    "created": stats.jobs_created,
                    "unresolved": stats.skipped_unresolved,
                    "no_template": stats.skipped_no_template,
                    "errors": stats.errors,
                }),
            )),
            Err(e) => Err(e),
        };
        finish_step(&gate, &mut report, STEP_PROJECTION, started, result).await;
    } else {
        report.skipped.push(STEP_PROJECTION);
    }

    // Sync verification
    if step_enabled(&gate, STEP_SYNC).await {
        let started = Instant::now();
        let result = match projector.verify_sync(now).await {
            Ok(stats) => Ok((
                format!(
                    "{} checked: {} synced, {} wrong date, {} wrong time, {} not created",
                    stats.checked,
                    stats.synced,
                    stats.wrong_date,
                    stats.wrong_time,
                    stats.not_created
                ),
                json!({
                    "checked": stats.checked,
                    "synced": stats.synced,
                    "wrong_date": stats.wrong_date,
                    "wrong_time": stats.wrong_time,
                    "not_created": stats.not_created,
                    "errors": stats.errors,
                }),
            )),
            Err(e) => Err(e),
        };
        finish_step(&gate, &mut report, STEP_SYNC, started, result).await;
    } else {
        report.skipped.push(STEP_SYNC);
    }

    // Service-line reconciliation
    if step_enabled(&gate, STEP_SERVICE_LINES).await {
        let started = Instant::now();
        let result = match projector.reconcile_service_lines().await {
            Ok(stats) => Ok((
                format!(
                    "{} descriptions, {} line items updated",
                    stats.descriptions_updated, stats.line_items_updated
                ),
                json!({
                    "examined": stats.examined,
                    "descriptions_updated": stats.descriptions_updated,
                    "line_items_updated": stats.line_items_updated,
                    "errors": stats.errors,
                }),
            )),
            Err(e) => Err(e),
        };
        finish_step(&gate, &mut report, STEP_SERVICE_LINES, started, result).await;
    } else {
        report.skipped.push(STEP_SERVICE_LINES);
    }

    for (name, outcome) in &report.steps {
        info!(
            step = name,
            success = outcome.success,
            duration_s = outcome.duration_seconds,
            message = %outcome.message,
            "step finished"
        );
    }
    Ok(report)
}

/// Gate check fails open: an unreachable Automations table should not
/// stop the suite.
async fn step_enabled(gate: &AutomationGate<'_>, name: &'static str) -> bool {
    match gate.is_enabled(name).await {
        Ok(enabled) => {
            if !enabled {
                info!(step = name, "step disabled, skipping");
            }
            enabled
        }
        Err(e) => {
            warn!(step = name, error = %e, "enable check failed, running anyway");
            true
        }
    }
}

async fn finish_step(
    gate: &AutomationGate<'_>,
    report: &mut SuiteReport,
    name: &'static str,
    started: Instant,
    result: Result<(String, Value)>,
) {
    let duration_seconds = started.elapsed().as_secs_f64();
    let outcome = match result {
        Ok((message, statistics)) => StepOutcome {
            success: true,
            duration_seconds,
            message,
            statistics,
        },
        Err(e) => {
            warn!(step = name, error = %e, "step failed");
            StepOutcome {
                success: false,
                duration_seconds,
                message: format!("{e:#}"),
                statistics: json!({}),
            }
        }
    };
    gate.record_outcome(name, &outcome, Utc::now()).await;
    report.steps.push((name, outcome));
}
