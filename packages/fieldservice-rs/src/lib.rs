//! Pure REST client for the downstream field-service job system.
//!
//! Token auth, a per-process token bucket so the whole service stays under
//! the vendor's request budget, and 429 handling that honors the
//! `RateLimit-Reset` header when the vendor sends one.
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldservice::Client;
//!
//! let api = Client::new("token".into(), 300);
//! let job = api.get_job("job_123").await?;
//! ```

pub mod error;
pub mod types;

pub use error::{FieldServiceError, Result};
pub use types::{
    Appointment, BulkUpdateLineItems, CreateJobRequest, CreatedJob, Job, JobFields, LineItem,
    Schedule, ScheduleInput,
};

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use types::{AppointmentsResponse, LineItemsResponse};

const DEFAULT_BASE_URL: &str = "https://api.fieldservice.io/v1";

/// 429 retries are capped here; the token bucket should make them rare.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
    limiter: Arc<DirectRateLimiter>,
}

impl Client {
    /// Create a client capped at `requests_per_minute` outbound calls.
    pub fn new(token: String, requests_per_minute: u32) -> Self {
        let per_minute =
            NonZeroU32::new(requests_per_minute).unwrap_or(nonzero!(300u32));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client should build");
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Point the client at a different API root (sandbox, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        self.send(|| self.http.get(&url)).await
    }

    pub async fn create_job(&self, request: &CreateJobRequest) -> Result<CreatedJob> {
        let url = format!("{}/jobs", self.base_url);
        self.send(|| self.http.post(&url).json(request)).await
    }

    pub async fn list_job_line_items(&self, job_id: &str) -> Result<Vec<LineItem>> {
        let url = format!("{}/jobs/{}/line_items", self.base_url, job_id);
        let resp: LineItemsResponse = self.send(|| self.http.get(&url)).await?;
        Ok(resp.data)
    }

    pub async fn bulk_update_line_items(
        &self,
        job_id: &str,
        line_items: Vec<LineItem>,
    ) -> Result<()> {
        let url = format!("{}/jobs/{}/line_items/bulk_update", self.base_url, job_id);
        let body = BulkUpdateLineItems { line_items };
        let _: serde_json::Value = self.send(|| self.http.put(&url).json(&body)).await?;
        Ok(())
    }

    pub async fn list_appointments(&self, job_id: &str) -> Result<Vec<Appointment>> {
        let url = format!("{}/jobs/{}/appointments", self.base_url, job_id);
        let resp: AppointmentsResponse = self.send(|| self.http.get(&url)).await?;
        Ok(resp.appointments)
    }

    /// Issue a request under the token bucket, retrying on 429.
    async fn send<T, F>(&self, build: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;

            let resp = build()
                .header("Authorization", format!("Token {}", self.token))
                .send()
                .await?;
            let status = resp.status();

            if status.as_u16() == 429 {
                if attempt >= MAX_RATE_LIMIT_RETRIES {
                    return Err(FieldServiceError::RateLimited);
                }
                let delay = resp
                    .headers()
                    .get("RateLimit-Reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt)));
                tracing::warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "field service rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let path = resp.url().path().to_string();
                let message = resp.text().await.unwrap_or_default();
                return Err(match status.as_u16() {
                    401 | 403 => FieldServiceError::Auth {
                        status: status.as_u16(),
                    },
                    404 => FieldServiceError::NotFound { path },
                    422 => FieldServiceError::Validation { message },
                    s => FieldServiceError::Api { status: s, message },
                });
            }

            return Ok(resp.json::<T>().await?);
        }
    }
}
