//! Webhook endpoints.
//!
//! Both endpoints honor the always-200 contract: external senders disable
//! endpoints that return non-2xx for any reason, so every internal outcome
//! is absorbed. The only exception is a malformed body, which is a
//! protocol error and gets a 400.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

use crate::kernel::webhook_queue::JobLifecycleEvent;
use crate::server::app::AppState;

pub const SERVICE_SIGNATURE_HEADER: &str = "X-Service-Signature";
pub const EMAIL_SIGNATURE_HEADER: &str = "X-Email-Signature";
pub const INTERNAL_AUTH_HEADER: &str = "X-Internal-Auth";

#[derive(Debug, Deserialize)]
struct FieldServicePayload {
    event: String,
    job: JobPayload,
}

#[derive(Debug, Deserialize)]
struct JobPayload {
    id: String,
    #[serde(default)]
    work_status: Option<String>,
    #[serde(default)]
    schedule: Option<SchedulePayload>,
}

#[derive(Debug, Deserialize)]
struct SchedulePayload {
    #[serde(default)]
    scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    scheduled_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EmailPayload {
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    filename: String,
    content: String,
}

fn ok() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Job-lifecycle events from the field-service system. The handler only
/// verifies, parses, and enqueues; workers do the record-store work.
pub async fn field_service_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    if !authorized(&state, &headers, &body, SERVICE_SIGNATURE_HEADER) {
        warn!("field-service webhook signature rejected");
        return ok().into_response();
    }

    let payload: FieldServicePayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "malformed field-service webhook body");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "malformed body"})))
                .into_response();
        }
    };

    let (scheduled_start, scheduled_end) = payload
        .job
        .schedule
        .map(|s| (s.scheduled_start, s.scheduled_end))
        .unwrap_or((None, None));
    state.queue.enqueue(JobLifecycleEvent {
        event: payload.event,
        job_id: payload.job.id,
        work_status: payload.job.work_status,
        scheduled_start,
        scheduled_end,
    });
    ok().into_response()
}

/// Email-with-CSV landing: decode attachments into the CSV inbox for the
/// next ingest run.
pub async fn email_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    // Signature is optional here; verify only when both sides have one.
    if headers.contains_key(EMAIL_SIGNATURE_HEADER)
        && !authorized(&state, &headers, &body, EMAIL_SIGNATURE_HEADER)
    {
        warn!("email webhook signature rejected");
        return ok().into_response();
    }

    let payload: EmailPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "malformed email webhook body");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "malformed body"})))
                .into_response();
        }
    };

    let inbox = state.deps.config.csv_process_dir();
    if let Err(e) = tokio::fs::create_dir_all(&inbox).await {
        warn!(error = %e, "CSV inbox unavailable");
        return ok().into_response();
    }

    for attachment in payload.attachments {
        let Some(name) = sanitize_csv_name(&attachment.filename) else {
            continue;
        };
        match BASE64.decode(attachment.content.as_bytes()) {
            Ok(decoded) => {
                let path = inbox.join(&name);
                match tokio::fs::write(&path, decoded).await {
                    Ok(()) => info!(file = %name, "CSV attachment landed"),
                    Err(e) => warn!(file = %name, error = %e, "CSV attachment write failed"),
                }
            }
            Err(e) => warn!(file = %name, error = %e, "attachment decode failed"),
        }
    }
    ok().into_response()
}

/// Either a valid HMAC signature or the trusted forwarder's shared secret
/// suffices.
fn authorized(state: &AppState, headers: &HeaderMap, body: &[u8], header: &str) -> bool {
    let config = &state.deps.config;

    if let (Some(expected), Some(provided)) = (
        config.internal_forward_secret.as_deref(),
        headers.get(INTERNAL_AUTH_HEADER).and_then(|v| v.to_str().ok()),
    ) {
        if constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
            return true;
        }
    }

    let Some(secret) = config.webhook_signing_secret.as_deref() else {
        // No secret configured: accept, but leave a trace.
        warn!("webhook accepted without signature verification (no secret configured)");
        return true;
    };
    let Some(signature) = headers.get(header).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    verify_signature(secret, body, signature)
}

/// Constant-time HMAC-SHA256 check over the raw body against
/// `sha256=<hex>`.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Keep only a bare `.csv` file name; anything path-like is dropped.
fn sanitize_csv_name(raw: &str) -> Option<String> {
    let name = std::path::Path::new(raw).file_name()?.to_str()?;
    if !name.to_lowercase().ends_with(".csv") {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"event":"job.updated"}"#;
        let header = sign("secret", body);
        assert!(verify_signature("secret", body, &header));
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("secret", b"tampered", &header));
        assert!(!verify_signature("secret", body, "sha256=nothex"));
        assert!(!verify_signature("secret", body, "md5=abc"));
    }

    #[test]
    fn csv_name_sanitization() {
        assert_eq!(
            sanitize_csv_name("report_tab2.csv"),
            Some("report_tab2.csv".to_string())
        );
        assert_eq!(
            sanitize_csv_name("../../etc/passwd.csv"),
            Some("passwd.csv".to_string())
        );
        assert_eq!(sanitize_csv_name("notes.txt"), None);
    }
}
