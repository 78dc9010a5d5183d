//! Shared dependency bundle wired once at startup.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::kernel::traits::{FieldServiceApi, RecordGateway};

pub struct Deps {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordGateway>,
    pub field_service: Arc<dyn FieldServiceApi>,
    /// Held for the duration of a suite run; overlapping cron fires skip
    /// instead of interleaving.
    pub run_lock: Mutex<()>,
}

impl Deps {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RecordGateway>,
        field_service: Arc<dyn FieldServiceApi>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            field_service,
            run_lock: Mutex::new(()),
        })
    }

    /// Production wiring over the REST clients.
    pub fn production(config: Config) -> Arc<Self> {
        let store = recordstore::Client::new(
            config.record_store_api_key.clone(),
            config.record_store_base_id.clone(),
        );
        let field_service = fieldservice::Client::new(
            config.field_service_token.clone(),
            config.field_service_rpm,
        );
        Self::new(Arc::new(config), Arc::new(store), Arc::new(field_service))
    }
}
