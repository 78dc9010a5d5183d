//! Typed errors for the field-service client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldServiceError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token rejected.
    #[error("authentication failed ({status})")]
    Auth { status: u16 },

    /// 429 after exhausting retries.
    #[error("rate limited")]
    RateLimited,

    /// Job or sub-resource does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The API rejected the payload.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Any other non-success response.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, FieldServiceError>;
