//! Supplier CSV ingest: detection, normalization, property resolution.
//!
//! Column maps are data, not code paths; each supplier contributes a
//! `ColumnMap` and the row loop is shared.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::common::identity::csv_uid;
use crate::common::types::{BlockType, EntryType, EventSource, ServiceType};
use crate::config::Config;
use crate::domains::reservations::models::event::{EventAction, ReservationEvent};
use crate::domains::reservations::models::property::{
    PropertyResolver, extract_listing_number,
};
use crate::domains::reservations::reconciler::Reconciler;
use crate::domains::reservations::session::SessionTracker;

/// Keyword that routes a row to a maintenance block.
const MAINTENANCE_KEYWORD: &str = "maintenance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supplier {
    Itrip,
    Evolve,
    EvolveTab2,
}

impl Supplier {
    pub fn source(&self) -> EventSource {
        match self {
            Supplier::Itrip => EventSource::ItripCsv,
            Supplier::Evolve => EventSource::EvolveCsv,
            Supplier::EvolveTab2 => EventSource::EvolveTab2Csv,
        }
    }

    fn columns(&self) -> &'static ColumnMap {
        match self {
            Supplier::Itrip => &ITRIP_COLUMNS,
            Supplier::Evolve | Supplier::EvolveTab2 => &EVOLVE_COLUMNS,
        }
    }
}

/// Per-supplier column layout.
pub struct ColumnMap {
    pub property: &'static str,
    pub guest: &'static str,
    pub check_in: &'static str,
    pub check_out: &'static str,
    pub status: Option<&'static str>,
    pub same_day: Option<&'static str>,
    pub supplier_info: Option<&'static str>,
    pub date_format: &'static str,
}

static ITRIP_COLUMNS: ColumnMap = ColumnMap {
    property: "Property Name",
    guest: "Guest Name",
    check_in: "Checkin",
    check_out: "Checkout",
    status: None,
    same_day: Some("Same Day?"),
    supplier_info: Some("Contractor Info"),
    date_format: "%m/%d/%Y",
};

static EVOLVE_COLUMNS: ColumnMap = ColumnMap {
    property: "Property",
    guest: "Guest Name",
    check_in: "Check-In",
    check_out: "Check-Out",
    status: Some("Status"),
    same_day: None,
    supplier_info: None,
    date_format: "%Y-%m-%d",
};

/// Deterministic supplier detection: filename suffix first, then the
/// iTrip-only `Property Name` header.
pub fn detect_supplier(file_name: &str, headers: &[String]) -> Supplier {
    if file_name.to_lowercase().ends_with("_tab2.csv") {
        Supplier::EvolveTab2
    } else if headers.iter().any(|h| h.trim() == ITRIP_COLUMNS.property) {
        Supplier::Itrip
    } else {
        Supplier::Evolve
    }
}

#[derive(Debug, Default, Clone)]
pub struct CsvIngestStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub rows_seen: usize,
    pub events_produced: usize,
    pub rows_outside_window: usize,
    pub rows_unmatched_property: usize,
    pub rows_invalid: usize,
    pub rows_skipped: usize,
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub errors: usize,
}

/// Parse one CSV file into normalized events.
pub fn parse_csv(
    file_name: &str,
    content: &str,
    resolver: &PropertyResolver,
    config: &Config,
    today: NaiveDate,
    stats: &mut CsvIngestStats,
) -> Result<Vec<ReservationEvent>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .context("missing CSV header row")?
        .iter()
        .map(str::to_string)
        .collect();
    let supplier = detect_supplier(file_name, &headers);
    let columns = supplier.columns();
    let (window_start, window_end) = config.event_window(today);

    let col = |name: &str| headers.iter().position(|h| h.as_str() == name);
    let property_idx = col(columns.property)
        .with_context(|| format!("column {:?} not found in {file_name}", columns.property))?;
    let guest_idx = col(columns.guest);
    let check_in_idx = col(columns.check_in)
        .with_context(|| format!("column {:?} not found in {file_name}", columns.check_in))?;
    let check_out_idx = col(columns.check_out)
        .with_context(|| format!("column {:?} not found in {file_name}", columns.check_out))?;
    let status_idx = columns.status.and_then(col);
    let same_day_idx = columns.same_day.and_then(col);
    let supplier_info_idx = columns.supplier_info.and_then(col);

    let mut events = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                stats.rows_invalid += 1;
                warn!(file = file_name, row = idx + 1, error = %e, "malformed CSV row");
                continue;
            }
        };
        stats.rows_seen += 1;

        let cell = |column: usize| row.get(column).unwrap_or("").trim();
        let property_cell = cell(property_idx);
        let guest = guest_idx.map(cell).unwrap_or("");
        let status = status_idx.map(cell).unwrap_or("").to_lowercase();
        let same_day_raw = same_day_idx.map(cell).unwrap_or("");
        let supplier_info = supplier_info_idx.map(cell).unwrap_or("");

        let check_in = NaiveDate::parse_from_str(cell(check_in_idx), columns.date_format);
        let check_out = NaiveDate::parse_from_str(cell(check_out_idx), columns.date_format);
        let (Ok(check_in), Ok(check_out)) = (check_in, check_out) else {
            stats.rows_invalid += 1;
            warn!(
                file = file_name,
                row = idx + 1,
                check_in = cell(check_in_idx),
                check_out = cell(check_out_idx),
                "invalid date"
            );
            continue;
        };
        if check_in < window_start || check_in > window_end {
            stats.rows_outside_window += 1;
            continue;
        }

        let property = match supplier {
            Supplier::Itrip => resolver.by_name(property_cell),
            Supplier::Evolve | Supplier::EvolveTab2 => {
                extract_listing_number(property_cell).and_then(|n| resolver.by_listing(n))
            }
        };
        let Some(property) = property else {
            stats.rows_unmatched_property += 1;
            warn!(
                file = file_name,
                row = idx + 1,
                property = property_cell,
                "unmatched property"
            );
            continue;
        };

        let event = match supplier {
            Supplier::EvolveTab2 => {
                // Tab 2 carries owner blocks only: the guest must be the
                // property's owner.
                let is_owner = property
                    .owner_name
                    .as_deref()
                    .is_some_and(|owner| owner.eq_ignore_ascii_case(guest));
                let action = match status.as_str() {
                    "booked" if is_owner => EventAction::Upsert,
                    "cancelled" if is_owner => EventAction::Remove,
                    _ => {
                        stats.rows_skipped += 1;
                        continue;
                    }
                };
                ReservationEvent {
                    source: supplier.source(),
                    action,
                    uid: csv_uid(
                        supplier.source().uid_source(),
                        property_cell,
                        check_in,
                        check_out,
                        None,
                    ),
                    feed_url: supplier.source().source_tag().to_string(),
                    property_id: property.id.clone(),
                    check_in,
                    check_out,
                    entry_type: EntryType::Block,
                    block_type: Some(BlockType::OwnerStay),
                    service_type: ServiceType::Turnover,
                    supplier_info: None,
                    same_day_override: None,
                }
            }
            Supplier::Itrip | Supplier::Evolve => {
                if supplier == Supplier::Evolve && status == "cancelled" {
                    stats.rows_skipped += 1;
                    // Cancellations surface through the feed dropping the
                    // booking; the main sheet only lists live bookings.
                    continue;
                }
                let is_maintenance = contains_keyword(guest, MAINTENANCE_KEYWORD)
                    || contains_keyword(supplier_info, MAINTENANCE_KEYWORD);
                let (entry_type, block_type, service_type) = if is_maintenance {
                    (
                        EntryType::Block,
                        Some(BlockType::Maintenance),
                        ServiceType::NeedsReview,
                    )
                } else {
                    (EntryType::Reservation, None, ServiceType::Turnover)
                };
                let guest_last = guest.split_whitespace().last();
                ReservationEvent {
                    source: supplier.source(),
                    action: EventAction::Upsert,
                    uid: csv_uid(
                        supplier.source().uid_source(),
                        property_cell,
                        check_in,
                        check_out,
                        guest_last,
                    ),
                    feed_url: supplier.source().source_tag().to_string(),
                    property_id: property.id.clone(),
                    check_in,
                    check_out,
                    entry_type,
                    block_type,
                    service_type,
                    supplier_info: if supplier == Supplier::Itrip && !supplier_info.is_empty() {
                        Some(supplier_info.to_string())
                    } else {
                        None
                    },
                    same_day_override: parse_same_day(same_day_raw),
                }
            }
        };
        events.push(event);
    }

    stats.events_produced += events.len();
    Ok(events)
}

fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    haystack.to_lowercase().contains(keyword)
}

fn parse_same_day(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Process every CSV in the drop zone: parse, reconcile, then archive.
/// The move to the done directory is the final step; a failed file stays
/// in place for the next run.
pub async fn ingest_csv_directory(
    config: &Config,
    resolver: &PropertyResolver,
    reconciler: &Reconciler<'_>,
    session: &mut SessionTracker,
    now: DateTime<Utc>,
) -> Result<CsvIngestStats> {
    let mut stats = CsvIngestStats::default();
    let inbox = config.csv_process_dir();
    if !inbox.exists() {
        info!(dir = %inbox.display(), "CSV inbox does not exist, nothing to ingest");
        return Ok(stats);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&inbox)
        .with_context(|| format!("reading {}", inbox.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();

    let today = now.with_timezone(&config.business_timezone).date_naive();
    for path in paths {
        match self::process_file(&path, config, resolver, reconciler, session, now, today, &mut stats)
            .await
        {
            Ok(()) => stats.files_processed += 1,
            Err(e) => {
                stats.files_failed += 1;
                warn!(file = %path.display(), error = %e, "CSV file left in place");
            }
        }
    }

    info!(
        processed = stats.files_processed,
        failed = stats.files_failed,
        events = stats.events_produced,
        "CSV ingest complete"
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
async fn process_file(
    path: &Path,
    config: &Config,
    resolver: &PropertyResolver,
    reconciler: &Reconciler<'_>,
    session: &mut SessionTracker,
    now: DateTime<Utc>,
    today: NaiveDate,
    stats: &mut CsvIngestStats,
) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("non-UTF8 file name")?
        .to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {file_name}"))?;

    let events = parse_csv(&file_name, &content, resolver, config, today, stats)?;
    let run = reconciler.apply_events(&events, session, now).await;
    stats.created += run.created;
    stats.modified += run.modified;
    stats.removed += run.removed;
    stats.errors += run.errors;
    if run.errors > 0 {
        anyhow::bail!("{} events failed to reconcile", run.errors);
    }

    let done_dir = config.csv_done_dir();
    tokio::fs::create_dir_all(&done_dir)
        .await
        .with_context(|| format!("creating {}", done_dir.display()))?;
    let stamped = format!("{}_{}", now.format("%Y%m%d_%H%M%S"), file_name);
    tokio::fs::rename(path, done_dir.join(&stamped))
        .await
        .with_context(|| format!("archiving {file_name}"))?;
    info!(file = %file_name, archived_as = %stamped, "CSV file processed");
    Ok(())
}
