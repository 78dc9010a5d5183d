//! Pure REST client for the hosted record store.
//!
//! Tables hold records; each record is an opaque id plus a JSON field map.
//! Queries are expressed as string formulas interpreted server-side, or as
//! named views. Transient failures and rate-limit signals are retried
//! transparently with exponential backoff and jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use recordstore::Client;
//!
//! let store = Client::new("api-key".into(), "base-id".into());
//! let active = store
//!     .list("Reservations", Some("{Status} != 'Old'"), None)
//!     .await?;
//! ```

pub mod error;
pub mod types;

pub use error::{RecordStoreError, Result};
pub use types::{Fields, Record};

use std::time::Duration;

use rand::Rng;
use types::{ApiErrorBody, BatchUpdatePayload, ListResponse, RecordPayload, RecordUpdate};

const DEFAULT_BASE_URL: &str = "https://api.recordstore.io/v0";

/// Maximum attempts for a single logical operation.
const MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff.
const BACKOFF_BASE_MS: u64 = 250;

/// The store caps batch mutations at this many records per request.
const BATCH_CHUNK: usize = 10;

pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    base_id: String,
}

impl Client {
    pub fn new(api_key: String, base_id: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            base_id,
        }
    }

    /// Point the client at a different API root (self-hosted, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.base_id,
            urlencoding::encode(table)
        )
    }

    /// List records matching a formula and/or view, following pagination.
    pub async fn list(
        &self,
        table: &str,
        formula: Option<&str>,
        view: Option<&str>,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let url = self.table_url(table);
            let page: ListResponse = self
                .request_with_retry(|| {
                    let mut req = self.http.get(&url).bearer_auth(&self.api_key);
                    if let Some(f) = formula {
                        req = req.query(&[("filterByFormula", f)]);
                    }
                    if let Some(v) = view {
                        req = req.query(&[("view", v)]);
                    }
                    if let Some(o) = &offset {
                        req = req.query(&[("offset", o.as_str())]);
                    }
                    req
                })
                .await?;

            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(table, count = records.len(), "listed records");
        Ok(records)
    }

    /// Fetch a single record by id.
    pub async fn find(&self, table: &str, id: &str) -> Result<Record> {
        let url = format!("{}/{}", self.table_url(table), id);
        self.request_with_retry(|| self.http.get(&url).bearer_auth(&self.api_key))
            .await
    }

    /// Create a record. Not retried past the first response: a timed-out
    /// create may have succeeded server-side, so the caller must re-query
    /// before retrying.
    pub async fn create(&self, table: &str, fields: Fields) -> Result<Record> {
        let url = self.table_url(table);
        let payload = RecordPayload { fields };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Update a subset of fields on one record.
    pub async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record> {
        let url = format!("{}/{}", self.table_url(table), id);
        let payload = RecordPayload { fields };
        self.request_with_retry(|| {
            self.http
                .patch(&url)
                .bearer_auth(&self.api_key)
                .json(&payload)
        })
        .await
    }

    /// Update many records, chunked to the store's batch limit.
    pub async fn batch_update(&self, table: &str, updates: Vec<(String, Fields)>) -> Result<()> {
        let url = self.table_url(table);
        for chunk in updates.chunks(BATCH_CHUNK) {
            let payload = BatchUpdatePayload {
                records: chunk
                    .iter()
                    .map(|(id, fields)| RecordUpdate {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect(),
            };
            let _: ListResponse = self
                .request_with_retry(|| {
                    self.http
                        .patch(&url)
                        .bearer_auth(&self.api_key)
                        .json(&payload)
                })
                .await?;
        }
        Ok(())
    }

    /// Issue a request, retrying transient failures with backoff + jitter.
    async fn request_with_retry<T, F>(&self, build: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let result = match build().send().await {
                Ok(resp) => Self::decode(resp).await,
                Err(e) => Err(RecordStoreError::Http(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = Self::backoff_delay(attempt, &e);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "record store request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Exponential backoff with full jitter; rate-limit hints win.
    fn backoff_delay(attempt: u32, error: &RecordStoreError) -> Duration {
        if let RecordStoreError::RateLimited {
            retry_after: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs);
        }
        let cap = BACKOFF_BASE_MS * 2u64.pow(attempt);
        let jittered = rand::thread_rng().gen_range(0..=cap);
        Duration::from_millis(jittered)
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let retry_after = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let path = resp.url().path().to_string();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message())
            .unwrap_or(body);

        Err(match status.as_u16() {
            401 | 403 => RecordStoreError::Auth {
                status: status.as_u16(),
            },
            404 => RecordStoreError::NotFound { path },
            422 => RecordStoreError::Validation { message },
            429 => RecordStoreError::RateLimited { retry_after },
            s => RecordStoreError::Api { status: s, message },
        })
    }
}

/// Escape a string literal for use inside a filter formula.
pub fn formula_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_escape_quotes() {
        assert_eq!(formula_escape("o'brien"), "o\\'brien");
        assert_eq!(formula_escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn retryable_classification() {
        assert!(RecordStoreError::RateLimited { retry_after: None }.is_retryable());
        assert!(RecordStoreError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!RecordStoreError::Validation {
            message: String::new()
        }
        .is_retryable());
        assert!(!RecordStoreError::Auth { status: 401 }.is_retryable());
    }
}
