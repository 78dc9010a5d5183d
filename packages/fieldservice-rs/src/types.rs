//! Wire types for the field-service job API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub work_status: Option<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrival_window: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Appointment {
    pub id: String,
}

/// A job line item. The same shape is read back and written in bulk
/// updates, so all fields are optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemsResponse {
    #[serde(default)]
    pub data: Vec<LineItem>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateLineItems {
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentsResponse {
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

/// Body for `POST /jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest {
    pub customer_id: String,
    pub address_id: String,
    pub assigned_employee_ids: Vec<String>,
    pub schedule: ScheduleInput,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,
    pub job_fields: JobFields,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleInput {
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub arrival_window: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFields {
    pub job_type_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedJob {
    pub id: String,
}
