//! The central reservation record: field mapping, typed accessors, and the
//! modification-clone field policy.

use chrono::{DateTime, NaiveDate, Utc};
use recordstore::{Fields, Record};
use serde_json::json;

use crate::common::identity::{Fingerprint, SignatureInputs, change_signature};
use crate::common::types::{
    BlockType, EntryType, JobStatus, RecordStatus, ServiceType, SyncStatus,
};

pub const RESERVATIONS_TABLE: &str = "Reservations";

/// Prefix applied to a demoted record's job id so stray webhooks cannot
/// resurrect stale links.
pub const OLD_JOB_PREFIX: &str = "old_";

/// Field names in the Reservations table.
pub mod fields {
    pub const UID: &str = "UID";
    pub const FEED_URL: &str = "Feed URL";
    pub const PROPERTY: &str = "Property";
    pub const CHECK_IN: &str = "Check-in Date";
    pub const CHECK_OUT: &str = "Check-out Date";
    pub const ENTRY_TYPE: &str = "Entry Type";
    pub const BLOCK_TYPE: &str = "Block Type";
    pub const SERVICE_TYPE: &str = "Service Type";
    pub const STATUS: &str = "Status";
    pub const SAME_DAY: &str = "Same-day Turnover";
    pub const OVERLAPPING: &str = "Overlapping Dates";
    pub const OWNER_ARRIVING: &str = "Owner Arriving";
    pub const LONG_TERM: &str = "Long-term Guest";
    pub const SUPPLIER_INFO: &str = "Supplier Info";
    pub const ITRIP_SAME_DAY: &str = "iTrip Same Day";
    pub const MISSING_COUNT: &str = "Missing Count";
    pub const MISSING_SINCE: &str = "Missing Since";
    pub const LAST_SEEN: &str = "Last Seen";
    pub const JOB_ID: &str = "Service Job ID";
    pub const APPOINTMENT_ID: &str = "Service Appointment ID";
    pub const JOB_STATUS: &str = "Job Status";
    pub const SCHEDULED_SERVICE_TIME: &str = "Scheduled Service Time";
    pub const FINAL_SERVICE_TIME: &str = "Final Service Time";
    pub const CUSTOM_INSTRUCTIONS: &str = "Custom Service Line Instructions";
    pub const SERVICE_LINE_DESCRIPTION: &str = "Service Line Description";
    pub const SYNC_STATUS: &str = "Sync Status";
    pub const SYNC_DETAILS: &str = "Sync Details";
    pub const SCHEDULE_SYNC_DETAILS: &str = "Schedule Sync Details";
    pub const LAST_UPDATED: &str = "Last Updated";
}

/// Fields never copied into a modification clone and never written by the
/// engine as part of cloning: formula output, diagnostic messages, and the
/// audit timestamp (always set explicitly).
pub const WRITE_BLACKLIST: &[&str] = &[
    fields::FINAL_SERVICE_TIME,
    fields::SYNC_DETAILS,
    fields::SCHEDULE_SYNC_DETAILS,
    fields::LAST_UPDATED,
];

/// Typed view over a Reservations record.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub record: Record,
}

impl Reservation {
    pub fn new(record: Record) -> Self {
        Self { record }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn uid(&self) -> Option<&str> {
        self.record.str_field(fields::UID)
    }

    pub fn feed_url(&self) -> Option<&str> {
        self.record.str_field(fields::FEED_URL)
    }

    pub fn property_id(&self) -> Option<&str> {
        self.record.linked_id(fields::PROPERTY)
    }

    pub fn check_in(&self) -> Option<NaiveDate> {
        parse_date(self.record.str_field(fields::CHECK_IN)?)
    }

    pub fn check_out(&self) -> Option<NaiveDate> {
        parse_date(self.record.str_field(fields::CHECK_OUT)?)
    }

    pub fn entry_type(&self) -> Option<EntryType> {
        EntryType::parse_opt(self.record.str_field(fields::ENTRY_TYPE)?)
    }

    pub fn block_type(&self) -> Option<BlockType> {
        BlockType::parse_opt(self.record.str_field(fields::BLOCK_TYPE)?)
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        ServiceType::parse_opt(self.record.str_field(fields::SERVICE_TYPE)?)
    }

    pub fn status(&self) -> Option<RecordStatus> {
        RecordStatus::parse_opt(self.record.str_field(fields::STATUS)?)
    }

    pub fn same_day(&self) -> bool {
        self.record.bool_field(fields::SAME_DAY)
    }

    pub fn overlapping(&self) -> bool {
        self.record.bool_field(fields::OVERLAPPING)
    }

    pub fn owner_arriving(&self) -> bool {
        self.record.bool_field(fields::OWNER_ARRIVING)
    }

    pub fn long_term(&self) -> bool {
        self.record.bool_field(fields::LONG_TERM)
    }

    pub fn supplier_info(&self) -> Option<&str> {
        self.record.str_field(fields::SUPPLIER_INFO)
    }

    /// The raw iTrip "Same Day?" column, when the row carried one. That
    /// value wins over the derived same-day flag.
    pub fn itrip_same_day(&self) -> Option<bool> {
        match self.record.str_field(fields::ITRIP_SAME_DAY)? {
            "Yes" | "yes" | "TRUE" | "true" => Some(true),
            "No" | "no" | "FALSE" | "false" => Some(false),
            _ => None,
        }
    }

    pub fn missing_count(&self) -> i64 {
        self.record.int_field(fields::MISSING_COUNT).unwrap_or(0)
    }

    pub fn missing_since(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.record.str_field(fields::MISSING_SINCE)?)
    }

    pub fn job_id(&self) -> Option<&str> {
        self.record.str_field(fields::JOB_ID).filter(|s| !s.is_empty())
    }

    pub fn appointment_id(&self) -> Option<&str> {
        self.record
            .str_field(fields::APPOINTMENT_ID)
            .filter(|s| !s.is_empty())
    }

    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::parse_opt(self.record.str_field(fields::JOB_STATUS)?)
    }

    pub fn final_service_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.record.str_field(fields::FINAL_SERVICE_TIME)?)
    }

    pub fn scheduled_service_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.record.str_field(fields::SCHEDULED_SERVICE_TIME)?)
    }

    pub fn custom_instructions(&self) -> Option<&str> {
        self.record
            .str_field(fields::CUSTOM_INSTRUCTIONS)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn service_line_description(&self) -> Option<&str> {
        self.record.str_field(fields::SERVICE_LINE_DESCRIPTION)
    }

    pub fn sync_status(&self) -> Option<SyncStatus> {
        SyncStatus::parse_opt(self.record.str_field(fields::SYNC_STATUS)?)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.record.str_field(fields::LAST_UPDATED)?)
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        Some(Fingerprint {
            property_id: self.property_id()?.to_string(),
            check_in: self.check_in()?,
            check_out: self.check_out()?,
            entry_type: self.entry_type()?,
        })
    }

    /// Content signature of this record's booking-owned fields.
    pub fn change_signature(&self) -> Option<String> {
        Some(change_signature(&SignatureInputs {
            check_in: self.check_in()?,
            check_out: self.check_out()?,
            property_id: self.property_id().unwrap_or(""),
            entry_type: self.entry_type()?,
            service_type: self.service_type().unwrap_or(ServiceType::Turnover),
            same_day: self.same_day(),
            overlapping: self.overlapping(),
            supplier_info: self.supplier_info(),
            block_type: self.block_type(),
        }))
    }

    /// Start a successor's field map: every field except the blacklist.
    /// The caller overwrites event-owned fields and sets the new status.
    pub fn successor_fields(&self, new_status: RecordStatus, now: DateTime<Utc>) -> Fields {
        let mut out = Fields::new();
        for (name, value) in &self.record.fields {
            if WRITE_BLACKLIST.contains(&name.as_str()) {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }
        out.insert(fields::STATUS.into(), json!(new_status.as_str()));
        out.insert(fields::LAST_UPDATED.into(), json!(format_timestamp(now)));
        // A live successor starts with clean removal-safety counters.
        out.insert(fields::MISSING_COUNT.into(), json!(0));
        out.remove(fields::MISSING_SINCE);
        out.insert(fields::LAST_SEEN.into(), json!(format_timestamp(now)));
        if new_status == RecordStatus::Removed {
            out.remove(fields::JOB_ID);
            out.remove(fields::APPOINTMENT_ID);
        }
        out
    }

    /// Field map that demotes this record to `Old`, renaming its job id so
    /// stray webhooks cannot find it.
    pub fn demotion_fields(&self, now: DateTime<Utc>) -> Fields {
        let mut out = Fields::new();
        out.insert(fields::STATUS.into(), json!(RecordStatus::Old.as_str()));
        out.insert(fields::LAST_UPDATED.into(), json!(format_timestamp(now)));
        if let Some(job_id) = self.job_id() {
            if !job_id.starts_with(OLD_JOB_PREFIX) {
                out.insert(
                    fields::JOB_ID.into(),
                    json!(format!("{OLD_JOB_PREFIX}{job_id}")),
                );
            }
        }
        out
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    raw.parse().ok()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Sort newest-first for tie-breaking: descending `Last Updated`, then
/// ascending record id. Used wherever multiple candidates compete.
pub fn sort_newest_first(records: &mut [Reservation]) {
    records.sort_by(|a, b| {
        let a_ts = a.last_updated();
        let b_ts = b.last_updated();
        b_ts.cmp(&a_ts)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}
