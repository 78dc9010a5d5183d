//! Typed errors for the record store client.

use thiserror::Error;

/// Errors returned by record store operations.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials rejected by the store.
    #[error("authentication failed ({status})")]
    Auth { status: u16 },

    /// The store rejected the payload (unknown field, bad field type).
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Record or table does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The store asked us to slow down.
    #[error("rate limited")]
    RateLimited { retry_after: Option<u64> },

    /// Any other non-success response.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RecordStoreError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecordStoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RecordStoreError::RateLimited { .. } => true,
            RecordStoreError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for record store operations.
pub type Result<T> = std::result::Result<T, RecordStoreError>;
