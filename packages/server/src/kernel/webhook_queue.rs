//! Webhook handoff: bounded in-process queue, disk-backed overflow, and
//! the worker pool that applies job-lifecycle events to the record store.
//!
//! The HTTP path only verifies, parses, and enqueues; the record-store
//! mutation always happens on a worker.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use recordstore::Fields;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::types::JobStatus;
use crate::domains::reservations::formulas;
use crate::domains::reservations::models::reservation::{
    OLD_JOB_PREFIX, RESERVATIONS_TABLE, Reservation, fields, format_timestamp,
    sort_newest_first,
};
use crate::kernel::traits::RecordGateway;

/// A job-lifecycle event as queued for the workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLifecycleEvent {
    pub event: String,
    pub job_id: String,
    pub work_status: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
}

/// Producer half: the HTTP handlers hold this.
pub struct WebhookQueue {
    tx: mpsc::Sender<JobLifecycleEvent>,
    overflow_path: PathBuf,
    capacity: usize,
}

impl WebhookQueue {
    pub fn new(
        capacity: usize,
        overflow_path: PathBuf,
    ) -> (Arc<Self>, mpsc::Receiver<JobLifecycleEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                tx,
                overflow_path,
                capacity: capacity.max(1),
            }),
            rx,
        )
    }

    /// Enqueue without blocking the HTTP path. A full queue spills to the
    /// overflow file; the sender still gets its 200.
    pub fn enqueue(&self, event: JobLifecycleEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(job_id = %event.job_id, "webhook queue full, spilling to overflow file");
                if let Err(e) = append_overflow(&self.overflow_path, &event) {
                    error!(error = %e, "failed to write webhook overflow");
                }
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(job_id = %event.job_id, "webhook queue closed, event dropped");
            }
        }
    }

    /// Events currently waiting in the channel.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

fn append_overflow(path: &Path, event: &JobLifecycleEvent) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(event)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Drain the queue with `worker_count` workers until cancelled. Any
/// events left in the overflow file from a previous saturation are
/// replayed first.
pub async fn run_workers(
    rx: mpsc::Receiver<JobLifecycleEvent>,
    worker_count: usize,
    store: Arc<dyn RecordGateway>,
    overflow_path: PathBuf,
    cancel: CancellationToken,
) {
    if let Err(e) = replay_overflow(&overflow_path, store.as_ref()).await {
        warn!(error = %e, "overflow replay failed");
    }

    let rx = Arc::new(Mutex::new(rx));
    let mut handles = Vec::new();
    for worker in 0..worker_count.max(1) {
        let rx = Arc::clone(&rx);
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let event = {
                    let mut rx = rx.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = rx.recv() => event,
                    }
                };
                let Some(event) = event else { break };
                if let Err(e) = apply_event(store.as_ref(), &event, Utc::now()).await {
                    warn!(worker, job_id = %event.job_id, error = %e, "webhook event failed");
                }
            }
            debug!(worker, "webhook worker stopped");
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// Replay the newline-delimited overflow file, then truncate it.
async fn replay_overflow(path: &Path, store: &dyn RecordGateway) -> Result<()> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).context("reading overflow file"),
    };
    let mut replayed = 0usize;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<JobLifecycleEvent>(line) {
            Ok(event) => {
                if let Err(e) = apply_event(store, &event, Utc::now()).await {
                    warn!(job_id = %event.job_id, error = %e, "overflow event failed");
                }
                replayed += 1;
            }
            Err(e) => warn!(error = %e, "unreadable overflow line dropped"),
        }
    }
    tokio::fs::write(path, b"")
        .await
        .context("truncating overflow file")?;
    if replayed > 0 {
        info!(replayed, "webhook overflow replayed");
    }
    Ok(())
}

/// Apply one job-lifecycle event: find the active record holding the job
/// id and update the fields the webhook path owns (job status and
/// observed schedule). Events naming a demoted `old_…` job are dropped.
pub async fn apply_event(
    store: &dyn RecordGateway,
    event: &JobLifecycleEvent,
    now: DateTime<Utc>,
) -> Result<()> {
    if event.job_id.starts_with(OLD_JOB_PREFIX) {
        debug!(job_id = %event.job_id, "stale job id, event dropped");
        return Ok(());
    }

    let records = store
        .query(RESERVATIONS_TABLE, &formulas::active_by_job_id(&event.job_id))
        .await?;
    let mut reservations: Vec<Reservation> = records.into_iter().map(Reservation::new).collect();
    sort_newest_first(&mut reservations);
    let Some(record) = reservations.first() else {
        debug!(job_id = %event.job_id, "no active record for job, event dropped");
        return Ok(());
    };

    let mut f = Fields::new();
    if let Some(status) = event
        .work_status
        .as_deref()
        .and_then(JobStatus::from_work_status)
    {
        if record.job_status() != Some(status) {
            f.insert(fields::JOB_STATUS.into(), json!(status.as_str()));
        }
    }
    if let Some(start) = event.scheduled_start {
        if record.scheduled_service_time() != Some(start) {
            f.insert(
                fields::SCHEDULED_SERVICE_TIME.into(),
                json!(format_timestamp(start)),
            );
        }
    }
    if f.is_empty() {
        return Ok(());
    }
    f.insert(
        fields::SYNC_DETAILS.into(),
        json!(format!(
            "{} via webhook {}",
            event.event,
            format_timestamp(now)
        )),
    );
    store.update(RESERVATIONS_TABLE, record.id(), f).await?;
    info!(job_id = %event.job_id, record_id = %record.id(), "webhook event applied");
    Ok(())
}
