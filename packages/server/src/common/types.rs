//! Core domain enums shared across ingest, reconciliation, and projection.
//!
//! Every enum round-trips through the record store's single-select string
//! form via `as_str` / `parse_opt`.

use std::fmt;

/// What kind of calendar entry a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Reservation,
    Block,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Reservation => "Reservation",
            EntryType::Block => "Block",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "Reservation" => Some(EntryType::Reservation),
            "Block" => Some(EntryType::Block),
            _ => None,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The service a record projects into the field-service system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Turnover,
    ReturnLaundry,
    Inspection,
    NeedsReview,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Turnover => "Turnover",
            ServiceType::ReturnLaundry => "Return Laundry",
            ServiceType::Inspection => "Inspection",
            ServiceType::NeedsReview => "Needs Review",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "Turnover" => Some(ServiceType::Turnover),
            "Return Laundry" => Some(ServiceType::ReturnLaundry),
            "Inspection" => Some(ServiceType::Inspection),
            "Needs Review" => Some(ServiceType::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reservation record lifecycle status.
///
/// At most one non-`Old` record exists per `(UID, Feed URL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    New,
    Modified,
    Removed,
    Old,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::New => "New",
            RecordStatus::Modified => "Modified",
            RecordStatus::Removed => "Removed",
            RecordStatus::Old => "Old",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "New" => Some(RecordStatus::New),
            "Modified" => Some(RecordStatus::Modified),
            "Removed" => Some(RecordStatus::Removed),
            "Old" => Some(RecordStatus::Old),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, RecordStatus::Old)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Downstream job status, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Unscheduled,
    Scheduled,
    InProgress,
    Completed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unscheduled => "Unscheduled",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::InProgress => "In Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Canceled => "Canceled",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "Unscheduled" => Some(JobStatus::Unscheduled),
            "Scheduled" => Some(JobStatus::Scheduled),
            "In Progress" => Some(JobStatus::InProgress),
            "Completed" => Some(JobStatus::Completed),
            "Canceled" => Some(JobStatus::Canceled),
            _ => None,
        }
    }

    /// Map the field-service `work_status` wire strings onto our enum.
    /// Unknown strings map to `None` and are left untouched upstream.
    pub fn from_work_status(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', " ");
        match normalized.as_str() {
            "unscheduled" | "needs scheduling" => Some(JobStatus::Unscheduled),
            "scheduled" => Some(JobStatus::Scheduled),
            "in progress" => Some(JobStatus::InProgress),
            "complete" | "completed" | "complete rated" | "complete unrated" => {
                Some(JobStatus::Completed)
            }
            "canceled" | "cancelled" | "user canceled" | "pro canceled" => {
                Some(JobStatus::Canceled)
            }
            _ => None,
        }
    }

    /// Statuses that block removal of a missing record.
    pub fn blocks_removal(&self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truthful classification of record-vs-job schedule divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Synced,
    WrongDate,
    WrongTime,
    NotCreated,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "Synced",
            SyncStatus::WrongDate => "Wrong Date",
            SyncStatus::WrongTime => "Wrong Time",
            SyncStatus::NotCreated => "Not Created",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "Synced" => Some(SyncStatus::Synced),
            "Wrong Date" => Some(SyncStatus::WrongDate),
            "Wrong Time" => Some(SyncStatus::WrongTime),
            "Not Created" => Some(SyncStatus::NotCreated),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a block exists, where upstream tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    OwnerStay,
    Maintenance,
    Other,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::OwnerStay => "Owner Stay",
            BlockType::Maintenance => "Maintenance",
            BlockType::Other => "Other",
        }
    }

    pub fn parse_opt(s: &str) -> Option<Self> {
        match s {
            "Owner Stay" => Some(BlockType::OwnerStay),
            "Maintenance" => Some(BlockType::Maintenance),
            "Other" => Some(BlockType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event came from. The ingest layer is polymorphic over these;
/// everything downstream consumes one normalized event schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    ItripCsv,
    EvolveCsv,
    EvolveTab2Csv,
    CalendarFeed,
    Webhook,
}

impl EventSource {
    /// The `Feed URL` discriminator stored for CSV-born records. Calendar
    /// events use their actual feed URL instead.
    pub fn source_tag(&self) -> &'static str {
        match self {
            EventSource::ItripCsv => "csv_itrip",
            EventSource::EvolveCsv => "csv_evolve",
            EventSource::EvolveTab2Csv => "csv_evolve_tab2",
            EventSource::CalendarFeed => "ics",
            EventSource::Webhook => "webhook",
        }
    }

    /// UID prefix for CSV-constructed identities.
    pub fn uid_source(&self) -> &'static str {
        match self {
            EventSource::ItripCsv => "itrip",
            EventSource::EvolveCsv | EventSource::EvolveTab2Csv => "evolve",
            EventSource::CalendarFeed => "ics",
            EventSource::Webhook => "webhook",
        }
    }

    /// Whether this source carries supplier info in its change signature.
    pub fn carries_supplier_info(&self) -> bool {
        matches!(self, EventSource::ItripCsv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            RecordStatus::New,
            RecordStatus::Modified,
            RecordStatus::Removed,
            RecordStatus::Old,
        ] {
            assert_eq!(RecordStatus::parse_opt(s.as_str()), Some(s));
        }
    }

    #[test]
    fn work_status_mapping() {
        assert_eq!(
            JobStatus::from_work_status("needs scheduling"),
            Some(JobStatus::Unscheduled)
        );
        assert_eq!(
            JobStatus::from_work_status("in_progress"),
            Some(JobStatus::InProgress)
        );
        assert_eq!(
            JobStatus::from_work_status("Complete Unrated"),
            Some(JobStatus::Completed)
        );
        assert_eq!(JobStatus::from_work_status("something else"), None);
    }

    #[test]
    fn scheduled_blocks_removal() {
        assert!(JobStatus::Scheduled.blocks_removal());
        assert!(JobStatus::InProgress.blocks_removal());
        assert!(!JobStatus::Completed.blocks_removal());
        assert!(!JobStatus::Unscheduled.blocks_removal());
    }
}
