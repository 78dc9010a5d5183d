//! Reservation reconciliation and job projection service.
//!
//! Ingests reservation events from supplier CSV batches, calendar feeds,
//! and webhooks; reconciles them into a history-preserving record-store
//! projection; and keeps the downstream field-service jobs convergent
//! with truthful divergence reporting.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
