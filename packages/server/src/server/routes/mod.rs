pub mod health;
pub mod webhooks;

pub use health::health_handler;
pub use webhooks::{email_webhook_handler, field_service_webhook_handler};
