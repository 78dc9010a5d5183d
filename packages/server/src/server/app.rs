//! Application setup and router assembly.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::kernel::deps::Deps;
use crate::kernel::webhook_queue::WebhookQueue;
use crate::server::routes::{email_webhook_handler, field_service_webhook_handler, health_handler};

#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<Deps>,
    pub queue: Arc<WebhookQueue>,
}

pub fn build_app(deps: Arc<Deps>, queue: Arc<WebhookQueue>) -> Router {
    let state = AppState { deps, queue };
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/field-service", post(field_service_webhook_handler))
        .route("/webhooks/email-csv", post(email_webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
