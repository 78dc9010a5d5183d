//! In-memory doubles for the gateway traits.
//!
//! `InMemoryGateway` understands the restricted formula shapes the engine
//! generates (`{Field} = '…'`, `{Field} != '…'`, `AND(…)`), which keeps
//! reconciler and projector tests off the network entirely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use fieldservice::{Appointment, CreateJobRequest, Job, LineItem, Schedule};
use recordstore::{Fields, Record};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::kernel::traits::{FieldServiceApi, RecordGateway};

/// An in-memory record store.
#[derive(Default)]
pub struct InMemoryGateway {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    next_id: AtomicU64,
    /// Total mutations (create/update) performed; idempotency tests assert
    /// on the delta between runs.
    pub writes: AtomicU64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with explicit fields, returning its id.
    pub async fn seed(&self, table: &str, fields: Fields) -> String {
        let id = format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = Record {
            id: id.clone(),
            fields,
            created_time: None,
        };
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record);
        id
    }

    pub async fn all(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordGateway for InMemoryGateway {
    async fn query(&self, table: &str, formula: &str) -> Result<Vec<Record>> {
        let predicate = FormulaPredicate::parse(formula)?;
        Ok(self
            .all(table)
            .await
            .into_iter()
            .filter(|r| predicate.matches(r))
            .collect())
    }

    async fn list_all(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.all(table).await)
    }

    async fn find(&self, table: &str, id: &str) -> Result<Record> {
        self.all(table)
            .await
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("record {table}/{id} not found"))
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = self.seed(table, fields).await;
        self.find(table, &id).await
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        let records = tables
            .get_mut(table)
            .ok_or_else(|| anyhow::anyhow!("table {table} not found"))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("record {table}/{id} not found"))?;
        for (name, value) in fields {
            if value.is_null() {
                record.fields.remove(&name);
            } else {
                record.fields.insert(name, value);
            }
        }
        Ok(record.clone())
    }

    async fn batch_update(&self, table: &str, updates: Vec<(String, Fields)>) -> Result<()> {
        for (id, fields) in updates {
            self.update(table, &id, fields).await?;
        }
        Ok(())
    }
}

/// The subset of formula syntax the engine emits.
enum FormulaPredicate {
    Eq(String, String),
    Ne(String, String),
    And(Vec<FormulaPredicate>),
}

impl FormulaPredicate {
    fn parse(formula: &str) -> Result<Self> {
        let trimmed = formula.trim();
        if let Some(inner) = trimmed
            .strip_prefix("AND(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts = split_top_level(inner)?;
            return Ok(FormulaPredicate::And(
                parts
                    .iter()
                    .map(|p| FormulaPredicate::parse(p))
                    .collect::<Result<Vec<_>>>()?,
            ));
        }
        Self::parse_comparison(trimmed)
    }

    fn parse_comparison(expr: &str) -> Result<Self> {
        let field_end = expr
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("unsupported formula: {expr}"))?;
        if !expr.starts_with('{') {
            bail!("unsupported formula: {expr}");
        }
        let field = expr[1..field_end].to_string();
        let rest = expr[field_end + 1..].trim_start();
        let (negated, rest) = if let Some(r) = rest.strip_prefix("!=") {
            (true, r)
        } else if let Some(r) = rest.strip_prefix('=') {
            (false, r)
        } else {
            bail!("unsupported operator in formula: {expr}");
        };
        let value = parse_quoted(rest.trim_start())?;
        Ok(if negated {
            FormulaPredicate::Ne(field, value)
        } else {
            FormulaPredicate::Eq(field, value)
        })
    }

    fn matches(&self, record: &Record) -> bool {
        match self {
            FormulaPredicate::Eq(field, value) => field_as_text(record, field) == *value,
            FormulaPredicate::Ne(field, value) => field_as_text(record, field) != *value,
            FormulaPredicate::And(parts) => parts.iter().all(|p| p.matches(record)),
        }
    }
}

/// Missing fields compare as the empty string, matching the store's
/// formula semantics.
fn field_as_text(record: &Record, field: &str) -> String {
    match record.fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => if *b { "1" } else { "" }.to_string(),
        _ => String::new(),
    }
}

fn split_top_level(input: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    let mut current = String::new();
    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => {
                current.push(c);
                escaped = true;
            }
            '\'' => {
                current.push(c);
                in_quote = !in_quote;
            }
            '(' if !in_quote => {
                current.push(c);
                depth += 1;
            }
            ')' if !in_quote => {
                current.push(c);
                depth = depth.saturating_sub(1);
            }
            ',' if !in_quote && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if in_quote {
        bail!("unterminated quote in formula: {input}");
    }
    parts.push(current);
    Ok(parts)
}

fn parse_quoted(input: &str) -> Result<String> {
    let mut chars = input.chars();
    if chars.next() != Some('\'') {
        bail!("expected quoted value in formula: {input}");
    }
    let mut out = String::new();
    let mut escaped = false;
    for c in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '\'' {
            return Ok(out);
        } else {
            out.push(c);
        }
    }
    bail!("unterminated quoted value: {input}")
}

/// A scriptable field-service double.
pub struct MockFieldService {
    pub jobs: Mutex<HashMap<String, Job>>,
    pub line_items: Mutex<HashMap<String, Vec<LineItem>>>,
    pub created: Mutex<Vec<CreateJobRequest>>,
    next_id: AtomicU64,
    /// When false, created jobs report no appointments (exercises the
    /// projector's second fetch attempt).
    pub appointments_available: AtomicBool,
    /// Maximum accepted line-item name length; longer names are rejected
    /// like the vendor does, forcing the truncation retry.
    pub line_item_name_limit: Option<usize>,
}

impl Default for MockFieldService {
    fn default() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            line_items: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            appointments_available: AtomicBool::new(true),
            line_item_name_limit: None,
        }
    }
}

impl MockFieldService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing job, e.g. a line-item template.
    pub async fn seed_job(&self, job: Job, line_items: Vec<LineItem>) {
        let id = job.id.clone();
        self.jobs.lock().await.insert(id.clone(), job);
        self.line_items.lock().await.insert(id, line_items);
    }

    /// Convenience: a job with the given schedule and status.
    pub fn job(
        id: &str,
        work_status: &str,
        start: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Job {
        Job {
            id: id.to_string(),
            work_status: Some(work_status.to_string()),
            schedule: Some(Schedule {
                scheduled_start: start,
                scheduled_end: start.map(|s| s + chrono::Duration::hours(1)),
                arrival_window: Some(0),
            }),
            appointments: vec![],
        }
    }
}

#[async_trait]
impl FieldServiceApi for MockFieldService {
    async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))
    }

    async fn create_job(&self, request: &CreateJobRequest) -> Result<String> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("job_{n}");
        let job = Job {
            id: id.clone(),
            work_status: Some("scheduled".to_string()),
            schedule: Some(Schedule {
                scheduled_start: Some(request.schedule.scheduled_start),
                scheduled_end: Some(request.schedule.scheduled_end),
                arrival_window: Some(request.schedule.arrival_window),
            }),
            appointments: vec![],
        };
        self.jobs.lock().await.insert(id.clone(), job);
        self.created.lock().await.push(request.clone());
        Ok(id)
    }

    async fn list_job_line_items(&self, job_id: &str) -> Result<Vec<LineItem>> {
        Ok(self
            .line_items
            .lock()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn bulk_update_line_items(&self, job_id: &str, items: Vec<LineItem>) -> Result<()> {
        if let Some(limit) = self.line_item_name_limit {
            if items.iter().any(|i| i.name.chars().count() > limit) {
                bail!("line item name too long");
            }
        }
        self.line_items
            .lock()
            .await
            .insert(job_id.to_string(), items);
        Ok(())
    }

    async fn list_appointments(&self, job_id: &str) -> Result<Vec<Appointment>> {
        if !self.appointments_available.load(Ordering::SeqCst) {
            return Ok(vec![]);
        }
        if self.jobs.lock().await.contains_key(job_id) {
            Ok(vec![Appointment {
                id: format!("appt_{job_id}"),
            }])
        } else {
            Ok(vec![])
        }
    }
}
