//! The reservation domain: models, ingest paths, the reconciler, and the
//! job projector.

pub mod formulas;
pub mod ingest;
pub mod models;
pub mod projector;
pub mod reconciler;
pub mod session;
