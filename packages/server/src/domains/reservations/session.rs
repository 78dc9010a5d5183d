//! Per-run session state shared by ingest and the reconciler.
//!
//! Some feed providers rotate UIDs on every fetch; the tracker keys events
//! by fingerprint so the first arrival wins and later arrivals with a
//! different UID are dropped before any record-store interaction. The same
//! fingerprints later suppress removal of records whose booking was seen
//! under a new UID.

use std::collections::{HashMap, HashSet};

use crate::common::identity::Fingerprint;
use crate::domains::reservations::models::event::{EventAction, ReservationEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First event with this fingerprint: process it.
    First,
    /// A same-fingerprint event already passed this run: drop it.
    Duplicate,
}

/// Constructed at run start and passed explicitly; never shared across
/// runs.
#[derive(Debug, Default)]
pub struct SessionTracker {
    first_uid_by_fingerprint: HashMap<Fingerprint, String>,
    observed_uids: HashMap<String, HashSet<String>>,
    /// Feeds that completed a successful fetch this run; only their
    /// records are eligible for the removal sweep.
    completed_feeds: HashSet<String>,
    pub duplicates_ignored: usize,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint gate, applied before any record lookup by UID.
    /// Removal events always pass: a cancellation is not a duplicate of
    /// the booking it cancels.
    pub fn admit(&mut self, event: &ReservationEvent) -> Admission {
        self.note_observed(&event.feed_url, &event.uid);
        if event.action == EventAction::Remove {
            return Admission::First;
        }
        let fingerprint = event.fingerprint();
        match self.first_uid_by_fingerprint.get(&fingerprint) {
            Some(first_uid) if *first_uid != event.uid => {
                self.duplicates_ignored += 1;
                Admission::Duplicate
            }
            Some(_) => Admission::First,
            None => {
                self.first_uid_by_fingerprint
                    .insert(fingerprint, event.uid.clone());
                Admission::First
            }
        }
    }

    pub fn note_observed(&mut self, feed_url: &str, uid: &str) {
        self.observed_uids
            .entry(feed_url.to_string())
            .or_default()
            .insert(uid.to_string());
    }

    /// Mark a feed as fully fetched; an errored feed must never have its
    /// records treated as removal candidates.
    pub fn mark_feed_complete(&mut self, feed_url: &str) {
        self.completed_feeds.insert(feed_url.to_string());
        self.observed_uids.entry(feed_url.to_string()).or_default();
    }

    pub fn completed_feeds(&self) -> impl Iterator<Item = &str> {
        self.completed_feeds.iter().map(String::as_str)
    }

    pub fn was_observed(&self, feed_url: &str, uid: &str) -> bool {
        self.observed_uids
            .get(feed_url)
            .is_some_and(|uids| uids.contains(uid))
    }

    /// Cross-UID rescue: was any event with this fingerprint seen this
    /// run, under whatever UID?
    pub fn fingerprint_seen(&self, fingerprint: &Fingerprint) -> bool {
        self.first_uid_by_fingerprint.contains_key(fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{EntryType, EventSource, ServiceType};
    use chrono::NaiveDate;

    fn event(uid: &str, property: &str, check_in: &str, check_out: &str) -> ReservationEvent {
        ReservationEvent {
            source: EventSource::CalendarFeed,
            action: EventAction::Upsert,
            uid: uid.to_string(),
            feed_url: "https://feeds.example/p1.ics".to_string(),
            property_id: property.to_string(),
            check_in: check_in.parse::<NaiveDate>().unwrap(),
            check_out: check_out.parse::<NaiveDate>().unwrap(),
            entry_type: EntryType::Reservation,
            block_type: None,
            service_type: ServiceType::Turnover,
            supplier_info: None,
            same_day_override: None,
        }
    }

    #[test]
    fn second_uid_with_same_fingerprint_is_duplicate() {
        let mut session = SessionTracker::new();
        let first = event("abc@x", "recP1", "2025-08-01", "2025-08-05");
        let second = event("def@x", "recP1", "2025-08-01", "2025-08-05");

        assert_eq!(session.admit(&first), Admission::First);
        assert_eq!(session.admit(&second), Admission::Duplicate);
        assert_eq!(session.duplicates_ignored, 1);
        // Both UIDs count as observed for removal purposes.
        assert!(session.was_observed("https://feeds.example/p1.ics", "abc@x"));
        assert!(session.was_observed("https://feeds.example/p1.ics", "def@x"));
    }

    #[test]
    fn same_uid_re_admitted() {
        let mut session = SessionTracker::new();
        let e = event("abc@x", "recP1", "2025-08-01", "2025-08-05");
        assert_eq!(session.admit(&e), Admission::First);
        assert_eq!(session.admit(&e), Admission::First);
        assert_eq!(session.duplicates_ignored, 0);
    }

    #[test]
    fn different_dates_are_not_duplicates() {
        let mut session = SessionTracker::new();
        let a = event("abc@x", "recP1", "2025-08-01", "2025-08-05");
        let b = event("def@x", "recP1", "2025-08-02", "2025-08-05");
        assert_eq!(session.admit(&a), Admission::First);
        assert_eq!(session.admit(&b), Admission::First);
    }

    #[test]
    fn fingerprint_seen_after_admit() {
        let mut session = SessionTracker::new();
        let e = event("abc@x", "recP1", "2025-08-01", "2025-08-05");
        session.admit(&e);
        assert!(session.fingerprint_seen(&e.fingerprint()));
    }
}
