use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::kernel::automations::AUTOMATIONS_TABLE;
use crate::kernel::traits::RecordGateway;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    record_store: DependencyHealth,
    webhook_queue_depth: usize,
}

#[derive(Serialize)]
pub struct DependencyHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check: record-store reachability plus queue depth.
/// Returns 200 when healthy, 503 otherwise.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let record_store = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.deps.store.list_all(AUTOMATIONS_TABLE),
    )
    .await
    {
        Ok(Ok(_)) => DependencyHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => DependencyHealth {
            status: "error".to_string(),
            error: Some(format!("{e:#}")),
        },
        Err(_) => DependencyHealth {
            status: "error".to_string(),
            error: Some("query timeout (>5s)".to_string()),
        },
    };

    let healthy = record_store.status == "ok";
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        record_store,
        webhook_queue_depth: state.queue.depth(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}
