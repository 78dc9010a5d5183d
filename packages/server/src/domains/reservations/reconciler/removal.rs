//! Removal safety: a feed dropping a booking is not proof the booking is
//! gone. Records are only removed after repeated misses, a grace period,
//! and date/job checks, and never when the booking was seen under another
//! UID this run.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use recordstore::Fields;
use serde_json::json;
use tracing::{debug, info};

use crate::domains::reservations::formulas;
use crate::domains::reservations::models::reservation::{
    RESERVATIONS_TABLE, Reservation, fields, format_timestamp,
};
use crate::domains::reservations::reconciler::Reconciler;
use crate::domains::reservations::session::SessionTracker;

/// Per-run removal-sweep counters.
#[derive(Debug, Default, Clone)]
pub struct RemovalStats {
    pub candidates: usize,
    pub removed: usize,
    pub rescued: usize,
    pub deferred: usize,
    pub counters_reset: usize,
}

/// Field map that clears the missing-tracking state after a record was
/// observed again.
pub fn reset_counters_fields(now: DateTime<Utc>) -> Fields {
    let mut f = Fields::new();
    f.insert(fields::MISSING_COUNT.into(), json!(0));
    f.insert(fields::MISSING_SINCE.into(), serde_json::Value::Null);
    f.insert(fields::LAST_SEEN.into(), json!(format_timestamp(now)));
    f
}

impl Reconciler<'_> {
    /// Evaluate removal candidates for every feed that completed a fetch
    /// this run. Records observed again get their counters reset; records
    /// still missing are counted, and removed only once every safety
    /// condition holds.
    pub async fn sweep_removals(
        &self,
        session: &SessionTracker,
        now: DateTime<Utc>,
    ) -> Result<RemovalStats> {
        let mut stats = RemovalStats::default();
        let mut feeds: Vec<&str> = session.completed_feeds().collect();
        feeds.sort_unstable();

        for feed_url in feeds {
            let records = self
                .store()
                .query(RESERVATIONS_TABLE, &formulas::active_by_feed(feed_url))
                .await?;
            let mut reservations: Vec<Reservation> =
                records.into_iter().map(Reservation::new).collect();
            reservations.sort_by(|a, b| a.id().cmp(b.id()));

            for record in reservations {
                let uid = match record.uid() {
                    Some(uid) => uid.to_string(),
                    None => continue,
                };
                // Already-removed records stay as history; never re-remove.
                if record.status() == Some(crate::common::types::RecordStatus::Removed) {
                    continue;
                }
                if session.was_observed(feed_url, &uid) {
                    if record.missing_count() > 0 || record.missing_since().is_some() {
                        self.store()
                            .update(
                                RESERVATIONS_TABLE,
                                record.id(),
                                reset_counters_fields(now),
                            )
                            .await?;
                        stats.counters_reset += 1;
                    }
                    continue;
                }

                stats.candidates += 1;

                // Cross-UID rescue: the booking surfaced under a new UID.
                if let Some(fp) = record.fingerprint() {
                    if session.fingerprint_seen(&fp) {
                        debug!(uid = %uid, "removal suppressed, fingerprint observed this run");
                        stats.rescued += 1;
                        continue;
                    }
                }

                if self.evaluate_candidate(&record, now).await? {
                    stats.removed += 1;
                } else {
                    stats.deferred += 1;
                }
            }
        }

        info!(
            candidates = stats.candidates,
            removed = stats.removed,
            rescued = stats.rescued,
            deferred = stats.deferred,
            "removal sweep complete"
        );
        Ok(stats)
    }

    /// Check eligibility against the state recorded by previous runs;
    /// when not yet eligible, count this run's miss. Returns whether the
    /// record was removed.
    async fn evaluate_candidate(
        &self,
        record: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let config = self.config();

        if self.eligible_for_removal(record, now) {
            self.remove_record(record, now).await?;
            return Ok(true);
        }

        let new_count = record.missing_count() + 1;
        let mut f = Fields::new();
        f.insert(fields::MISSING_COUNT.into(), json!(new_count));
        if record.missing_since().is_none() {
            f.insert(fields::MISSING_SINCE.into(), json!(format_timestamp(now)));
        }
        self.store()
            .update(RESERVATIONS_TABLE, record.id(), f)
            .await?;
        debug!(
            record_id = %record.id(),
            missing_count = new_count,
            threshold = config.missing_count_threshold,
            "removal deferred"
        );
        Ok(false)
    }

    fn eligible_for_removal(&self, record: &Reservation, now: DateTime<Utc>) -> bool {
        let config = self.config();

        if record.missing_count() < config.missing_count_threshold {
            return false;
        }

        let grace = Duration::hours(config.missing_grace_hours);
        match record.missing_since() {
            Some(since) if now - since >= grace => {}
            _ => return false,
        }

        if record.job_status().is_some_and(|s| s.blocks_removal()) {
            return false;
        }

        // Never remove around an imminent stay boundary.
        let today = now.with_timezone(&config.business_timezone).date_naive();
        let tomorrow = today + Duration::days(1);
        if let Some(check_in) = record.check_in() {
            if check_in >= today && check_in <= tomorrow {
                return false;
            }
        }
        if let Some(check_out) = record.check_out() {
            if check_out == today || check_out == tomorrow {
                return false;
            }
        }

        true
    }
}
