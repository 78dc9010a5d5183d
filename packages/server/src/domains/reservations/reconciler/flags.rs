//! Flag recomputation over each property's active calendar.
//!
//! Derived per reservation: overlapping dates, same-day turnover (with the
//! owner-arrival carve-out and the iTrip override), owner arriving, and
//! long-term guest.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use recordstore::Fields;
use serde_json::json;
use tracing::info;

use crate::common::types::{BlockType, EntryType};
use crate::domains::reservations::formulas;
use crate::domains::reservations::models::reservation::{
    RESERVATIONS_TABLE, Reservation, fields,
};
use crate::domains::reservations::reconciler::Reconciler;

/// One active entry on a property's calendar.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub record_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub entry_type: EntryType,
    pub block_type: Option<BlockType>,
}

/// Active entries grouped by property, sorted by check-in then id for
/// deterministic next-entry selection.
#[derive(Debug, Default)]
pub struct PropertyIndex {
    by_property: HashMap<String, Vec<CalendarEntry>>,
}

impl PropertyIndex {
    pub fn build(records: &[Reservation]) -> Self {
        let mut by_property: HashMap<String, Vec<CalendarEntry>> = HashMap::new();
        for r in records {
            let (Some(property), Some(check_in), Some(check_out), Some(entry_type)) =
                (r.property_id(), r.check_in(), r.check_out(), r.entry_type())
            else {
                continue;
            };
            by_property
                .entry(property.to_string())
                .or_default()
                .push(CalendarEntry {
                    record_id: r.id().to_string(),
                    check_in,
                    check_out,
                    entry_type,
                    block_type: r.block_type(),
                });
        }
        for entries in by_property.values_mut() {
            entries.sort_by(|a, b| {
                a.check_in
                    .cmp(&b.check_in)
                    .then_with(|| a.record_id.cmp(&b.record_id))
            });
        }
        Self { by_property }
    }

    pub fn entries(&self, property_id: &str) -> &[CalendarEntry] {
        self.by_property
            .get(property_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The next entry at the property with check-in on or after `date`,
    /// excluding the record itself.
    pub fn next_entry_after(
        &self,
        property_id: &str,
        date: NaiveDate,
        exclude_record: &str,
    ) -> Option<&CalendarEntry> {
        self.entries(property_id)
            .iter()
            .find(|e| e.check_in >= date && e.record_id != exclude_record)
    }

    /// The next reservation check-in on or after `date`.
    pub fn next_reservation_checkin(
        &self,
        property_id: &str,
        date: NaiveDate,
        exclude_record: &str,
    ) -> Option<NaiveDate> {
        self.entries(property_id)
            .iter()
            .find(|e| {
                e.entry_type == EntryType::Reservation
                    && e.check_in >= date
                    && e.record_id != exclude_record
            })
            .map(|e| e.check_in)
    }
}

/// The flag set derived for one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedFlags {
    pub same_day: bool,
    pub overlapping: bool,
    pub owner_arriving: bool,
    pub long_term: bool,
}

/// Pure flag derivation for one reservation against its property's
/// calendar.
pub fn derive_flags(
    record: &Reservation,
    index: &PropertyIndex,
    long_term_threshold_days: i64,
) -> Option<DerivedFlags> {
    let property = record.property_id()?;
    let check_in = record.check_in()?;
    let check_out = record.check_out()?;
    if record.entry_type()? != EntryType::Reservation {
        return None;
    }

    let siblings = index.entries(property);

    let overlapping = siblings.iter().any(|e| {
        e.record_id != record.id()
            && e.entry_type == EntryType::Reservation
            && check_in < e.check_out
            && e.check_in < check_out
    });

    // Same-day turnover is a guest-to-guest notion: only another
    // reservation's check-in counts.
    let derived_same_day = siblings.iter().any(|e| {
        e.record_id != record.id()
            && e.entry_type == EntryType::Reservation
            && e.check_in == check_out
    });

    let next = index.next_entry_after(property, check_out, record.id());
    let owner_arriving = next.is_some_and(|e| {
        e.entry_type == EntryType::Block && (e.check_in - check_out) <= Duration::days(1)
    });

    let same_day = match record.itrip_same_day() {
        // An explicit upstream answer wins over anything derived.
        Some(explicit) => explicit,
        None => {
            if owner_arriving && record.same_day() {
                // Owner arrivals are signaled via the owner-arriving flag;
                // never let them erase an existing same-day value.
                true
            } else {
                derived_same_day
            }
        }
    };

    let long_term = (check_out - check_in) >= Duration::days(long_term_threshold_days);

    Some(DerivedFlags {
        same_day,
        overlapping,
        owner_arriving,
        long_term,
    })
}

/// Per-run flag counters.
#[derive(Debug, Default, Clone)]
pub struct FlagStats {
    pub examined: usize,
    pub updated: usize,
}

impl Reconciler<'_> {
    /// Recompute all derived flags over the active records and persist
    /// only the ones that changed.
    pub async fn recompute_flags(&self, _now: DateTime<Utc>) -> Result<FlagStats> {
        let records = self
            .store()
            .query(RESERVATIONS_TABLE, &formulas::active())
            .await?;
        let mut reservations: Vec<Reservation> =
            records.into_iter().map(Reservation::new).collect();
        reservations.sort_by(|a, b| a.id().cmp(b.id()));

        let index = PropertyIndex::build(&reservations);
        let threshold = self.config().long_term_threshold_days;

        let mut stats = FlagStats::default();
        let mut updates: Vec<(String, Fields)> = Vec::new();
        for record in &reservations {
            let Some(derived) = derive_flags(record, &index, threshold) else {
                continue;
            };
            stats.examined += 1;

            let mut changed = Fields::new();
            if derived.same_day != record.same_day() {
                changed.insert(fields::SAME_DAY.into(), json!(derived.same_day));
            }
            if derived.overlapping != record.overlapping() {
                changed.insert(fields::OVERLAPPING.into(), json!(derived.overlapping));
            }
            if derived.owner_arriving != record.owner_arriving() {
                changed.insert(fields::OWNER_ARRIVING.into(), json!(derived.owner_arriving));
            }
            if derived.long_term != record.long_term() {
                changed.insert(fields::LONG_TERM.into(), json!(derived.long_term));
            }
            if !changed.is_empty() {
                stats.updated += 1;
                updates.push((record.id().to_string(), changed));
            }
        }

        if !updates.is_empty() {
            self.store()
                .batch_update(RESERVATIONS_TABLE, updates)
                .await?;
        }
        info!(
            examined = stats.examined,
            updated = stats.updated,
            "flag recomputation complete"
        );
        Ok(stats)
    }
}
