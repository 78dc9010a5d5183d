//! Application configuration loaded from environment variables.
//!
//! Two tiers: `ENVIRONMENT` selects the per-environment credential set and
//! on-disk directories; everything else is a shared option with a default.
//! The config is read once at startup and never re-read.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{Months, NaiveDate};
use dotenvy::dotenv;
use std::env;

use crate::common::types::ServiceType;

/// Deployment environment; selects credentials, directories, log names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Directory and log-name suffix for this environment.
    pub fn suffix(&self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Production => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => bail!("unknown environment: {other}"),
        }
    }
}

/// Immutable application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    // Record store (C1)
    pub record_store_api_key: String,
    pub record_store_base_id: String,

    // Field service (C2)
    pub field_service_token: String,
    pub field_service_employee_id: String,
    pub field_service_rpm: u32,
    pub turnover_job_type_id: String,
    pub return_laundry_job_type_id: String,
    pub inspection_job_type_id: String,

    // Webhook intake (C8)
    pub port: u16,
    pub webhook_signing_secret: Option<String>,
    pub internal_forward_secret: Option<String>,
    pub webhook_queue_capacity: usize,
    pub webhook_workers: usize,

    // Ingest windows and pools
    pub fetch_window_months_before: u32,
    pub fetch_window_months_after: u32,
    pub feed_concurrency: usize,
    pub feed_timeout_seconds: u64,

    // Reconciler policy
    pub long_term_threshold_days: i64,
    pub missing_count_threshold: i64,
    pub missing_grace_hours: i64,

    // Orchestrator
    pub run_timeout_seconds: u64,
    pub suite_cron: String,

    // Shared
    pub business_timezone: chrono_tz::Tz,
    pub data_root: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .parse()?;

        Ok(Self {
            environment,
            record_store_api_key: env::var("RECORD_STORE_API_KEY")
                .context("RECORD_STORE_API_KEY must be set")?,
            record_store_base_id: env::var("RECORD_STORE_BASE_ID")
                .context("RECORD_STORE_BASE_ID must be set")?,
            field_service_token: env::var("FIELD_SERVICE_TOKEN")
                .context("FIELD_SERVICE_TOKEN must be set")?,
            field_service_employee_id: env::var("FIELD_SERVICE_EMPLOYEE_ID")
                .context("FIELD_SERVICE_EMPLOYEE_ID must be set")?,
            field_service_rpm: parse_or("FIELD_SERVICE_RPM", 300)?,
            turnover_job_type_id: env::var("TURNOVER_JOB_TYPE_ID").unwrap_or_default(),
            return_laundry_job_type_id: env::var("RETURN_LAUNDRY_JOB_TYPE_ID")
                .unwrap_or_default(),
            inspection_job_type_id: env::var("INSPECTION_JOB_TYPE_ID").unwrap_or_default(),
            port: parse_or("PORT", 8080)?,
            webhook_signing_secret: env::var("WEBHOOK_SIGNING_SECRET").ok(),
            internal_forward_secret: env::var("INTERNAL_FORWARD_SECRET").ok(),
            webhook_queue_capacity: parse_or("WEBHOOK_QUEUE_CAPACITY", 1000)?,
            webhook_workers: parse_or("WEBHOOK_WORKERS", 4)?,
            fetch_window_months_before: parse_or("FETCH_WINDOW_MONTHS_BEFORE", 6)?,
            fetch_window_months_after: parse_or("FETCH_WINDOW_MONTHS_AFTER", 3)?,
            feed_concurrency: parse_or("FEED_CONCURRENCY", 50)?,
            feed_timeout_seconds: parse_or("FEED_TIMEOUT_SECONDS", 30)?,
            long_term_threshold_days: parse_or("LONG_TERM_THRESHOLD_DAYS", 14)?,
            missing_count_threshold: parse_or("MISSING_COUNT_THRESHOLD", 3)?,
            missing_grace_hours: parse_or("MISSING_GRACE_HOURS", 12)?,
            run_timeout_seconds: parse_or("RUN_TIMEOUT_SECONDS", 600)?,
            suite_cron: env::var("SUITE_CRON").unwrap_or_else(|_| "0 0 * * * *".to_string()),
            business_timezone: env::var("BUSINESS_TIMEZONE")
                .unwrap_or_else(|_| "America/Phoenix".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("BUSINESS_TIMEZONE invalid: {e}"))?,
            data_root: env::var("DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        })
    }

    /// CSV drop zone for this environment.
    pub fn csv_process_dir(&self) -> PathBuf {
        self.data_root
            .join(format!("CSV_process_{}", self.environment.suffix()))
    }

    /// Archive for successfully processed CSV files.
    pub fn csv_done_dir(&self) -> PathBuf {
        self.data_root
            .join(format!("CSV_done_{}", self.environment.suffix()))
    }

    /// Newline-delimited JSON overflow for a saturated webhook queue.
    pub fn webhook_overflow_path(&self) -> PathBuf {
        self.data_root.join("webhook_overflow").join("events.ndjson")
    }

    /// Job-type id for a service type. Empty when not configured.
    pub fn job_type_id(&self, service: ServiceType) -> &str {
        match service {
            ServiceType::Turnover | ServiceType::NeedsReview => &self.turnover_job_type_id,
            ServiceType::ReturnLaundry => &self.return_laundry_job_type_id,
            ServiceType::Inspection => &self.inspection_job_type_id,
        }
    }

    /// Accepted event window around `today`: events outside are dropped.
    pub fn event_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today - Months::new(self.fetch_window_months_before);
        let end = today + Months::new(self.fetch_window_months_after);
        (start, end)
    }

    /// A config suitable for unit and integration tests: no credentials,
    /// tight pools, a temp-friendly data root.
    pub fn for_tests(data_root: PathBuf) -> Self {
        Self {
            environment: Environment::Development,
            record_store_api_key: String::new(),
            record_store_base_id: String::new(),
            field_service_token: String::new(),
            field_service_employee_id: "emp_test".to_string(),
            field_service_rpm: 300,
            turnover_job_type_id: "jt_turnover".to_string(),
            return_laundry_job_type_id: "jt_laundry".to_string(),
            inspection_job_type_id: "jt_inspection".to_string(),
            port: 0,
            webhook_signing_secret: Some("test-signing-secret".to_string()),
            internal_forward_secret: Some("test-forward-secret".to_string()),
            webhook_queue_capacity: 16,
            webhook_workers: 1,
            fetch_window_months_before: 6,
            fetch_window_months_after: 3,
            feed_concurrency: 4,
            feed_timeout_seconds: 5,
            long_term_threshold_days: 14,
            missing_count_threshold: 3,
            missing_grace_hours: 12,
            run_timeout_seconds: 60,
            suite_cron: "0 0 * * * *".to_string(),
            business_timezone: chrono_tz::America::Phoenix,
            data_root,
        }
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} must be valid: {e}")),
        Err(_) => Ok(default),
    }
}
