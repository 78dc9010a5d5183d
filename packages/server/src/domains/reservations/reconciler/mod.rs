//! The reconciler: consumes normalized events and mutates the record store
//! into a convergent, history-preserving projection.

pub mod flags;
pub mod removal;

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::common::types::RecordStatus;
use crate::config::Config;
use crate::domains::reservations::formulas;
use crate::domains::reservations::models::event::{EventAction, ReservationEvent};
use crate::domains::reservations::models::reservation::{
    RESERVATIONS_TABLE, Reservation, sort_newest_first,
};
use crate::domains::reservations::session::{Admission, SessionTracker};
use crate::kernel::traits::RecordGateway;

/// Grace interval before committing a modification clone, to let an
/// in-flight writer for the same key finish.
const MODIFY_GRACE: Duration = Duration::from_millis(100);

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Created,
    Modified,
    Unchanged,
    Removed,
    DuplicateIgnored,
    /// A concurrent writer produced a newer record during the grace
    /// interval; this event was dropped.
    RaceSkipped,
    /// Removal event with nothing active to remove.
    NoOp,
}

/// Per-run reconciliation counters.
#[derive(Debug, Default, Clone)]
pub struct ReconcileStats {
    pub created: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub duplicates_ignored: usize,
    pub race_skipped: usize,
    pub healed_duplicates: usize,
    pub errors: usize,
}

impl ReconcileStats {
    fn note(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Created => self.created += 1,
            EventOutcome::Modified => self.modified += 1,
            EventOutcome::Unchanged => self.unchanged += 1,
            EventOutcome::Removed => self.removed += 1,
            EventOutcome::DuplicateIgnored => self.duplicates_ignored += 1,
            EventOutcome::RaceSkipped => self.race_skipped += 1,
            EventOutcome::NoOp => {}
        }
    }

    pub fn merge(&mut self, other: &ReconcileStats) {
        self.created += other.created;
        self.modified += other.modified;
        self.unchanged += other.unchanged;
        self.removed += other.removed;
        self.duplicates_ignored += other.duplicates_ignored;
        self.race_skipped += other.race_skipped;
        self.healed_duplicates += other.healed_duplicates;
        self.errors += other.errors;
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn RecordGateway,
    config: &'a Config,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn RecordGateway, config: &'a Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub(crate) fn store(&self) -> &dyn RecordGateway {
        self.store
    }

    /// Apply a batch of events. Per-event errors are counted and logged,
    /// never propagated; within a run, operations on one `(UID, feed_url)`
    /// are serialized by processing events in order.
    pub async fn apply_events(
        &self,
        events: &[ReservationEvent],
        session: &mut SessionTracker,
        now: DateTime<Utc>,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        for event in events {
            match self.process_event(event, session, now, &mut stats).await {
                Ok(outcome) => stats.note(outcome),
                Err(e) => {
                    stats.errors += 1;
                    warn!(
                        uid = %event.uid,
                        feed_url = %event.feed_url,
                        error = %e,
                        "event processing failed"
                    );
                }
            }
        }
        stats
    }

    /// The per-event decision for `(UID, feed_url)`.
    pub async fn process_event(
        &self,
        event: &ReservationEvent,
        session: &mut SessionTracker,
        now: DateTime<Utc>,
        stats: &mut ReconcileStats,
    ) -> Result<EventOutcome> {
        // Fingerprint gate first: a dynamic-UID source must be cut off
        // before any lookup by its current UID.
        if session.admit(event) == Admission::Duplicate {
            debug!(uid = %event.uid, "duplicate fingerprint, ignored");
            return Ok(EventOutcome::DuplicateIgnored);
        }

        let mut active = self.active_records(&event.uid, &event.feed_url).await?;
        let newest = self.heal_duplicates(&mut active, now, stats).await?;

        match (event.action, newest) {
            (EventAction::Remove, Some(existing)) => {
                if existing.status() == Some(RecordStatus::Removed) {
                    // A repeated cancellation must not clone again.
                    return Ok(EventOutcome::NoOp);
                }
                self.remove_record(&existing, now).await?;
                Ok(EventOutcome::Removed)
            }
            (EventAction::Remove, None) => Ok(EventOutcome::NoOp),
            (EventAction::Upsert, None) => {
                self.store
                    .create(RESERVATIONS_TABLE, event.create_fields(now))
                    .await?;
                info!(uid = %event.uid, feed_url = %event.feed_url, "created record");
                Ok(EventOutcome::Created)
            }
            (EventAction::Upsert, Some(existing)) => {
                let revive = existing.status() == Some(RecordStatus::Removed);
                if !revive
                    && event.change_signature(Some(&existing))
                        == existing.change_signature().unwrap_or_default()
                {
                    self.touch_if_tracked(&existing, now).await?;
                    return Ok(EventOutcome::Unchanged);
                }
                self.modify_record(&existing, event, now).await
            }
        }
    }

    /// Fetch active records for an external identity, newest first.
    async fn active_records(&self, uid: &str, feed_url: &str) -> Result<Vec<Reservation>> {
        let records = self
            .store
            .query(RESERVATIONS_TABLE, &formulas::active_by_uid(uid, feed_url))
            .await?;
        let mut reservations: Vec<Reservation> =
            records.into_iter().map(Reservation::new).collect();
        sort_newest_first(&mut reservations);
        Ok(reservations)
    }

    /// Invariant recovery: when more than one active record exists for the
    /// same key, the newest wins and the rest are demoted.
    async fn heal_duplicates(
        &self,
        active: &mut Vec<Reservation>,
        now: DateTime<Utc>,
        stats: &mut ReconcileStats,
    ) -> Result<Option<Reservation>> {
        if active.is_empty() {
            return Ok(None);
        }
        let newest = active.remove(0);
        for stale in active.drain(..) {
            warn!(
                record_id = %stale.id(),
                uid = stale.uid().unwrap_or(""),
                "healing duplicate active record"
            );
            self.store
                .update(
                    RESERVATIONS_TABLE,
                    stale.id(),
                    stale.demotion_fields(now),
                )
                .await?;
            stats.healed_duplicates += 1;
        }
        Ok(Some(newest))
    }

    /// Modification path: wait out the grace interval, confirm no newer
    /// writer appeared, then clone-and-demote.
    async fn modify_record(
        &self,
        snapshot: &Reservation,
        event: &ReservationEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        tokio::time::sleep(MODIFY_GRACE).await;

        let recheck = self.active_records(&event.uid, &event.feed_url).await?;
        let still_current = recheck
            .first()
            .is_some_and(|r| r.id() == snapshot.id() && r.last_updated() == snapshot.last_updated());
        if !still_current {
            debug!(uid = %event.uid, "newer record appeared during grace interval, skipping");
            return Ok(EventOutcome::RaceSkipped);
        }

        let mut fields = snapshot.successor_fields(RecordStatus::Modified, now);
        event.overwrite_owned_fields(&mut fields);
        self.store.create(RESERVATIONS_TABLE, fields).await?;
        self.store
            .update(
                RESERVATIONS_TABLE,
                snapshot.id(),
                snapshot.demotion_fields(now),
            )
            .await?;
        info!(
            uid = %event.uid,
            predecessor = %snapshot.id(),
            "modification clone created"
        );
        Ok(EventOutcome::Modified)
    }

    /// Removal clone: history-preserving, with the job link cleared on the
    /// successor and renamed on the predecessor.
    pub(crate) async fn remove_record(
        &self,
        record: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let fields = record.successor_fields(RecordStatus::Removed, now);
        self.store.create(RESERVATIONS_TABLE, fields).await?;
        self.store
            .update(RESERVATIONS_TABLE, record.id(), record.demotion_fields(now))
            .await?;
        info!(
            uid = record.uid().unwrap_or(""),
            predecessor = %record.id(),
            "record removed"
        );
        Ok(())
    }

    /// An unchanged event only writes when the removal-safety machinery
    /// had started counting this record missing.
    async fn touch_if_tracked(&self, record: &Reservation, now: DateTime<Utc>) -> Result<()> {
        if record.missing_count() > 0 || record.missing_since().is_some() {
            self.store
                .update(
                    RESERVATIONS_TABLE,
                    record.id(),
                    removal::reset_counters_fields(now),
                )
                .await?;
            debug!(record_id = %record.id(), "missing counters reset");
        }
        Ok(())
    }
}
