//! The job projector: ensures each serviceable reservation has exactly one
//! downstream job, keeps its first line item current, and reports schedule
//! divergence truthfully instead of silently reconciling it.

pub mod service_line;

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use fieldservice::{CreateJobRequest, JobFields, LineItem, ScheduleInput};
use recordstore::Fields;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::common::types::{EntryType, JobStatus, RecordStatus, SyncStatus};
use crate::config::Config;
use crate::domains::reservations::formulas;
use crate::domains::reservations::models::property::PropertyResolver;
use crate::domains::reservations::models::reservation::{
    OLD_JOB_PREFIX, RESERVATIONS_TABLE, Reservation, fields, format_timestamp,
};
use crate::domains::reservations::reconciler::flags::PropertyIndex;
use crate::kernel::traits::{FieldServiceApi, RecordGateway};
use service_line::{ServiceLineInputs, service_line_description};

/// Effective cap the vendor enforces on a line-item name.
const LINE_ITEM_NAME_LIMIT: usize = 200;

/// Delay between the two appointment-id fetch attempts.
const APPOINTMENT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone)]
pub struct ProjectionStats {
    pub examined: usize,
    pub jobs_created: usize,
    pub skipped_unresolved: usize,
    pub skipped_no_template: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub checked: usize,
    pub synced: usize,
    pub wrong_date: usize,
    pub wrong_time: usize,
    pub not_created: usize,
    pub errors: usize,
}

#[derive(Debug, Default, Clone)]
pub struct LineStats {
    pub examined: usize,
    pub descriptions_updated: usize,
    pub line_items_updated: usize,
    pub errors: usize,
}

pub struct Projector<'a> {
    store: &'a dyn RecordGateway,
    api: &'a dyn FieldServiceApi,
    config: &'a Config,
}

impl<'a> Projector<'a> {
    pub fn new(
        store: &'a dyn RecordGateway,
        api: &'a dyn FieldServiceApi,
        config: &'a Config,
    ) -> Self {
        Self { store, api, config }
    }

    /// Create downstream jobs for serviceable records that lack one.
    pub async fn project_jobs(
        &self,
        resolver: &PropertyResolver,
        now: DateTime<Utc>,
    ) -> Result<ProjectionStats> {
        let mut stats = ProjectionStats::default();
        let reservations = self.active_reservations().await?;
        let index = PropertyIndex::build(&reservations);

        for record in &reservations {
            if !self.needs_job(record) {
                continue;
            }
            stats.examined += 1;
            match self.create_job_for(record, resolver, &index, now).await {
                Ok(JobCreation::Created) => stats.jobs_created += 1,
                Ok(JobCreation::Unresolved) => stats.skipped_unresolved += 1,
                Ok(JobCreation::NoTemplate) => stats.skipped_no_template += 1,
                Err(e) => {
                    stats.errors += 1;
                    warn!(record_id = %record.id(), error = %e, "job creation failed");
                }
            }
        }

        info!(
            examined = stats.examined,
            created = stats.jobs_created,
            "job projection complete"
        );
        Ok(stats)
    }

    /// Sync-only pass: re-fetch every linked job and report divergence.
    pub async fn verify_sync(&self, now: DateTime<Utc>) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let reservations = self.active_reservations().await?;
        let tz = self.config.business_timezone;

        for record in &reservations {
            let Some(final_time) = record.final_service_time() else {
                continue;
            };
            if record.status() == Some(RecordStatus::Removed) {
                continue;
            }
            stats.checked += 1;

            let result = match record.job_id() {
                None => {
                    self.apply_sync_result(record, SyncStatus::NotCreated, None, None, now)
                        .await
                }
                Some(job_id) => match self.api.get_job(job_id).await {
                    Ok(job) => {
                        let observed = job.schedule.as_ref().and_then(|s| s.scheduled_start);
                        let status = classify_divergence(final_time, observed, tz);
                        let details = divergence_details(status, final_time, observed, now, tz);
                        self.apply_sync_result(record, status, observed, details, now)
                            .await
                    }
                    Err(e) if is_not_found(&e) => {
                        let details = Some(format!(
                            "Job {} no longer exists (checked {})",
                            job_id,
                            business_time(now, tz)
                        ));
                        self.apply_sync_result(record, SyncStatus::NotCreated, None, details, now)
                            .await
                    }
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(status) => match status {
                    SyncStatus::Synced => stats.synced += 1,
                    SyncStatus::WrongDate => stats.wrong_date += 1,
                    SyncStatus::WrongTime => stats.wrong_time += 1,
                    SyncStatus::NotCreated => stats.not_created += 1,
                },
                Err(e) => {
                    stats.errors += 1;
                    warn!(record_id = %record.id(), error = %e, "sync verification failed");
                }
            }
        }

        info!(
            checked = stats.checked,
            synced = stats.synced,
            wrong_date = stats.wrong_date,
            wrong_time = stats.wrong_time,
            not_created = stats.not_created,
            "sync verification complete"
        );
        Ok(stats)
    }

    /// Recompute service-line descriptions and push changed ones into the
    /// downstream first line item, preserving manual notes before `|`.
    pub async fn reconcile_service_lines(&self) -> Result<LineStats> {
        let mut stats = LineStats::default();
        let reservations = self.active_reservations().await?;
        let index = PropertyIndex::build(&reservations);

        for record in &reservations {
            if record.entry_type() != Some(EntryType::Reservation)
                || record.final_service_time().is_none()
                || record.status() == Some(RecordStatus::Removed)
            {
                continue;
            }
            stats.examined += 1;

            if let Err(e) = self.reconcile_one_line(record, &index, &mut stats).await {
                stats.errors += 1;
                warn!(record_id = %record.id(), error = %e, "service line update failed");
            }
        }

        info!(
            examined = stats.examined,
            descriptions = stats.descriptions_updated,
            line_items = stats.line_items_updated,
            "service line reconciliation complete"
        );
        Ok(stats)
    }

    async fn reconcile_one_line(
        &self,
        record: &Reservation,
        index: &PropertyIndex,
        stats: &mut LineStats,
    ) -> Result<()> {
        let desired = self.describe(record, index);

        if record.service_line_description() != Some(desired.as_str()) {
            let mut f = Fields::new();
            f.insert(fields::SERVICE_LINE_DESCRIPTION.into(), json!(desired));
            self.store
                .update(RESERVATIONS_TABLE, record.id(), f)
                .await?;
            stats.descriptions_updated += 1;
        }

        let Some(job_id) = record.job_id() else {
            return Ok(());
        };
        if job_id.starts_with(OLD_JOB_PREFIX) {
            return Ok(());
        }

        let mut items = self.api.list_job_line_items(job_id).await?;
        let Some(first) = items.first_mut() else {
            return Ok(());
        };
        let updated = updated_line_name(&first.name, &desired);
        if updated == first.name {
            return Ok(());
        }
        first.name = updated;
        self.api.bulk_update_line_items(job_id, items).await?;
        stats.line_items_updated += 1;
        Ok(())
    }

    async fn active_reservations(&self) -> Result<Vec<Reservation>> {
        let records = self
            .store
            .query(RESERVATIONS_TABLE, &formulas::active())
            .await?;
        let mut reservations: Vec<Reservation> =
            records.into_iter().map(Reservation::new).collect();
        reservations.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(reservations)
    }

    fn needs_job(&self, record: &Reservation) -> bool {
        record.entry_type() == Some(EntryType::Reservation)
            && record.status().is_some_and(|s| {
                matches!(s, RecordStatus::New | RecordStatus::Modified)
            })
            && record.final_service_time().is_some()
            && record.job_id().is_none()
    }

    fn describe(&self, record: &Reservation, index: &PropertyIndex) -> String {
        let next = record.property_id().zip(record.check_out()).and_then(
            |(property, check_out)| index.next_entry_after(property, check_out, record.id()),
        );
        let next_block_checkin = next
            .filter(|e| e.entry_type == EntryType::Block)
            .map(|e| e.check_in);
        let next_guest_checkin = record.property_id().zip(record.check_out()).and_then(
            |(property, check_out)| {
                index.next_reservation_checkin(property, check_out, record.id())
            },
        );
        service_line_description(&ServiceLineInputs {
            service_type: record.service_type(),
            custom_instructions: record.custom_instructions(),
            same_day: record.same_day(),
            owner_arriving: record.owner_arriving(),
            long_term: record.long_term(),
            next_block_checkin,
            next_guest_checkin,
        })
    }

    async fn create_job_for(
        &self,
        record: &Reservation,
        resolver: &PropertyResolver,
        index: &PropertyIndex,
        now: DateTime<Utc>,
    ) -> Result<JobCreation> {
        let property = record.property_id().and_then(|id| resolver.by_id(id));
        let Some(property) = property else {
            return Ok(JobCreation::Unresolved);
        };
        let (Some(customer_id), Some(address_id)) =
            (property.customer_id.as_deref(), property.address_id.as_deref())
        else {
            return Ok(JobCreation::Unresolved);
        };
        let service = match record.service_type() {
            Some(s) => s,
            None => return Ok(JobCreation::Unresolved),
        };
        let Some(template_id) = property.template_id(service) else {
            return Ok(JobCreation::NoTemplate);
        };
        let Some(final_time) = record.final_service_time() else {
            return Ok(JobCreation::Unresolved);
        };

        let description = self.describe(record, index);
        let template_items = self.api.list_job_line_items(template_id).await?;

        let request = CreateJobRequest {
            customer_id: customer_id.to_string(),
            address_id: address_id.to_string(),
            assigned_employee_ids: vec![self.config.field_service_employee_id.clone()],
            schedule: ScheduleInput {
                scheduled_start: final_time,
                scheduled_end: final_time + chrono::Duration::hours(1),
                arrival_window: 0,
            },
            line_items: Vec::new(),
            job_fields: JobFields {
                job_type_id: self.config.job_type_id(service).to_string(),
            },
        };
        let job_id = self.api.create_job(&request).await?;
        debug!(record_id = %record.id(), job_id = %job_id, "job created");

        self.install_line_items(&job_id, template_items, &description)
            .await?;
        let appointment_id = self.fetch_appointment(&job_id).await?;

        let tz = self.config.business_timezone;
        let mut f = Fields::new();
        f.insert(fields::JOB_ID.into(), json!(job_id));
        if let Some(appointment_id) = &appointment_id {
            f.insert(fields::APPOINTMENT_ID.into(), json!(appointment_id));
        }
        f.insert(
            fields::JOB_STATUS.into(),
            json!(JobStatus::Scheduled.as_str()),
        );
        f.insert(
            fields::SCHEDULED_SERVICE_TIME.into(),
            json!(format_timestamp(final_time)),
        );
        f.insert(
            fields::SERVICE_LINE_DESCRIPTION.into(),
            json!(description),
        );
        f.insert(
            fields::SYNC_STATUS.into(),
            json!(SyncStatus::Synced.as_str()),
        );
        f.insert(
            fields::SYNC_DETAILS.into(),
            json!(format!("Job created {}", business_time(now, tz))),
        );
        self.store
            .update(RESERVATIONS_TABLE, record.id(), f)
            .await?;
        Ok(JobCreation::Created)
    }

    /// Clone the template's line items onto the new job with the first
    /// item renamed; one truncation retry when the vendor rejects the
    /// name.
    async fn install_line_items(
        &self,
        job_id: &str,
        template_items: Vec<LineItem>,
        description: &str,
    ) -> Result<()> {
        let mut items = if template_items.is_empty() {
            vec![LineItem::default()]
        } else {
            template_items
        };
        for item in &mut items {
            item.id = None;
        }
        items[0].name = description.to_string();

        match self.api.bulk_update_line_items(job_id, items.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if description.chars().count() > LINE_ITEM_NAME_LIMIT => {
                debug!(job_id, error = %e, "line item rejected, retrying truncated");
                items[0].name = description
                    .chars()
                    .take(LINE_ITEM_NAME_LIMIT)
                    .collect::<String>();
                self.api.bulk_update_line_items(job_id, items).await
            }
            Err(e) => Err(e),
        }
    }

    /// The appointment id shows up shortly after job creation; two
    /// attempts with a short pause cover the lag.
    async fn fetch_appointment(&self, job_id: &str) -> Result<Option<String>> {
        for attempt in 0..2 {
            let appointments = self.api.list_appointments(job_id).await?;
            if let Some(first) = appointments.first() {
                return Ok(Some(first.id.clone()));
            }
            if attempt == 0 {
                tokio::time::sleep(APPOINTMENT_RETRY_DELAY).await;
            }
        }
        warn!(job_id, "no appointment id after two attempts");
        Ok(None)
    }

    /// Persist one record's sync verdict. Returns the status applied.
    async fn apply_sync_result(
        &self,
        record: &Reservation,
        status: SyncStatus,
        observed_start: Option<DateTime<Utc>>,
        details: Option<String>,
        _now: DateTime<Utc>,
    ) -> Result<SyncStatus> {
        let mut f = Fields::new();
        if record.sync_status() != Some(status) {
            f.insert(fields::SYNC_STATUS.into(), json!(status.as_str()));
        }
        if let Some(observed) = observed_start {
            if record.scheduled_service_time() != Some(observed) {
                f.insert(
                    fields::SCHEDULED_SERVICE_TIME.into(),
                    json!(format_timestamp(observed)),
                );
            }
        }
        // Diagnostic is written only on divergence so a later Synced state
        // does not erase the last useful message.
        if let Some(details) = details {
            f.insert(fields::SCHEDULE_SYNC_DETAILS.into(), json!(details));
        }
        if !f.is_empty() {
            self.store
                .update(RESERVATIONS_TABLE, record.id(), f)
                .await?;
        }
        Ok(status)
    }
}

enum JobCreation {
    Created,
    Unresolved,
    NoTemplate,
}

/// A deleted downstream job surfaces as `NotFound` from the client, or as
/// a plain message from test doubles.
fn is_not_found(error: &anyhow::Error) -> bool {
    if let Some(e) = error.downcast_ref::<fieldservice::FieldServiceError>() {
        return matches!(e, fieldservice::FieldServiceError::NotFound { .. });
    }
    error.chain().any(|c| c.to_string().contains("not found"))
}

/// Compare desired and observed service times in the business timezone at
/// minute granularity.
pub fn classify_divergence(
    final_time: DateTime<Utc>,
    observed_start: Option<DateTime<Utc>>,
    tz: Tz,
) -> SyncStatus {
    let Some(observed) = observed_start else {
        return SyncStatus::WrongDate;
    };
    let want = final_time.with_timezone(&tz);
    let got = observed.with_timezone(&tz);
    if want.date_naive() != got.date_naive() {
        SyncStatus::WrongDate
    } else if (want.hour(), want.minute()) != (got.hour(), got.minute()) {
        SyncStatus::WrongTime
    } else {
        SyncStatus::Synced
    }
}

/// Human-readable divergence message; `None` when in sync.
pub fn divergence_details(
    status: SyncStatus,
    final_time: DateTime<Utc>,
    observed_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: Tz,
) -> Option<String> {
    let label = match status {
        SyncStatus::Synced => return None,
        SyncStatus::WrongDate => "Wrong date",
        SyncStatus::WrongTime => "Wrong time",
        SyncStatus::NotCreated => return None,
    };
    let observed = match observed_start {
        Some(t) => business_time(t, tz),
        None => "no scheduled start".to_string(),
    };
    Some(format!(
        "{label}: expected {}, job shows {} (checked {})",
        business_time(final_time, tz),
        observed,
        business_time(now, tz),
    ))
}

/// `08/01 14:03` style timestamp in the business timezone.
pub fn business_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%m/%d %H:%M").to_string()
}

/// Rewrite only the auto segment after `|`, preserving manual notes, under
/// the vendor's effective length limit.
pub fn updated_line_name(current: &str, auto: &str) -> String {
    let manual = match current.find('|') {
        Some(idx) => current[..idx].trim_end(),
        None => current.trim_end(),
    };
    let combined = if manual.is_empty() {
        auto.to_string()
    } else {
        format!("{manual} | {auto}")
    };
    if combined.chars().count() <= LINE_ITEM_NAME_LIMIT {
        return combined;
    }
    combined.chars().take(LINE_ITEM_NAME_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phoenix() -> Tz {
        chrono_tz::America::Phoenix
    }

    fn utc(s: &str) -> DateTime<Utc> {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn divergence_classification() {
        // 10:15 Phoenix == 17:15 UTC.
        let want = utc("2025-09-10 17:15");
        assert_eq!(
            classify_divergence(want, Some(want), phoenix()),
            SyncStatus::Synced
        );
        assert_eq!(
            classify_divergence(want, Some(utc("2025-09-10 17:45")), phoenix()),
            SyncStatus::WrongTime
        );
        assert_eq!(
            classify_divergence(want, Some(utc("2025-09-11 17:15")), phoenix()),
            SyncStatus::WrongDate
        );
        assert_eq!(
            classify_divergence(want, None, phoenix()),
            SyncStatus::WrongDate
        );
    }

    #[test]
    fn seconds_do_not_matter() {
        let want = utc("2025-09-10 17:15");
        let got = want + chrono::Duration::seconds(30);
        assert_eq!(classify_divergence(want, Some(got), phoenix()), SyncStatus::Synced);
    }

    #[test]
    fn line_name_preserves_manual_notes() {
        assert_eq!(
            updated_line_name("gate code 4411 | old text", "new text"),
            "gate code 4411 | new text"
        );
        assert_eq!(
            updated_line_name("just manual", "new text"),
            "just manual | new text"
        );
        assert_eq!(updated_line_name("", "new text"), "new text");
    }

    #[test]
    fn line_name_respects_limit() {
        let manual = "m".repeat(150);
        let auto = "a".repeat(100);
        let combined = updated_line_name(&manual, &auto);
        assert_eq!(combined.chars().count(), LINE_ITEM_NAME_LIMIT);
    }
}
