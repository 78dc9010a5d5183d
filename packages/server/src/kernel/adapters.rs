//! Production implementations of the gateway traits over the REST clients.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fieldservice::{Appointment, CreateJobRequest, Job, LineItem};
use recordstore::{Fields, Record};

use crate::kernel::traits::{FieldServiceApi, RecordGateway};

#[async_trait]
impl RecordGateway for recordstore::Client {
    async fn query(&self, table: &str, formula: &str) -> Result<Vec<Record>> {
        self.list(table, Some(formula), None)
            .await
            .with_context(|| format!("query {table}"))
    }

    async fn list_all(&self, table: &str) -> Result<Vec<Record>> {
        self.list(table, None, None)
            .await
            .with_context(|| format!("list {table}"))
    }

    async fn find(&self, table: &str, id: &str) -> Result<Record> {
        recordstore::Client::find(self, table, id)
            .await
            .with_context(|| format!("find {table}/{id}"))
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record> {
        recordstore::Client::create(self, table, fields)
            .await
            .with_context(|| format!("create in {table}"))
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
        recordstore::Client::update(self, table, id, fields)
            .await
            .with_context(|| format!("update {table}/{id}"))
    }

    async fn batch_update(&self, table: &str, updates: Vec<(String, Fields)>) -> Result<()> {
        recordstore::Client::batch_update(self, table, updates)
            .await
            .with_context(|| format!("batch update {table}"))
    }
}

#[async_trait]
impl FieldServiceApi for fieldservice::Client {
    async fn get_job(&self, job_id: &str) -> Result<Job> {
        fieldservice::Client::get_job(self, job_id)
            .await
            .with_context(|| format!("get job {job_id}"))
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<String> {
        let created = fieldservice::Client::create_job(self, request)
            .await
            .context("create job")?;
        Ok(created.id)
    }

    async fn list_job_line_items(&self, job_id: &str) -> Result<Vec<LineItem>> {
        fieldservice::Client::list_job_line_items(self, job_id)
            .await
            .with_context(|| format!("list line items for {job_id}"))
    }

    async fn bulk_update_line_items(&self, job_id: &str, items: Vec<LineItem>) -> Result<()> {
        fieldservice::Client::bulk_update_line_items(self, job_id, items)
            .await
            .with_context(|| format!("bulk update line items for {job_id}"))
    }

    async fn list_appointments(&self, job_id: &str) -> Result<Vec<Appointment>> {
        fieldservice::Client::list_appointments(self, job_id)
            .await
            .with_context(|| format!("list appointments for {job_id}"))
    }
}
