//! Seams between the engine and its two external systems.
//!
//! All persistent side effects flow through these traits; production wires
//! the REST clients in, tests wire `kernel::testing` doubles.

use anyhow::Result;
use async_trait::async_trait;
use fieldservice::{Appointment, CreateJobRequest, Job, LineItem};
use recordstore::{Fields, Record};

/// Typed operations over the record store.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    /// Records matching a filter formula.
    async fn query(&self, table: &str, formula: &str) -> Result<Vec<Record>>;

    /// All records in a table.
    async fn list_all(&self, table: &str) -> Result<Vec<Record>>;

    async fn find(&self, table: &str, id: &str) -> Result<Record>;

    async fn create(&self, table: &str, fields: Fields) -> Result<Record>;

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record>;

    async fn batch_update(&self, table: &str, updates: Vec<(String, Fields)>) -> Result<()>;
}

/// Typed operations over the field-service job system.
#[async_trait]
pub trait FieldServiceApi: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Job>;

    /// Returns the created job's id.
    async fn create_job(&self, request: &CreateJobRequest) -> Result<String>;

    async fn list_job_line_items(&self, job_id: &str) -> Result<Vec<LineItem>>;

    async fn bulk_update_line_items(&self, job_id: &str, items: Vec<LineItem>) -> Result<()>;

    async fn list_appointments(&self, job_id: &str) -> Result<Vec<Appointment>>;
}
