use crate::config::AppConfig;
use crate::coordinator::Coordinator;
use crate::db::schema_manager::SchemaManager;
use std::sync::Arc;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub coordinator: Arc<Coordinator>,
    pub schema_manager: Arc<SchemaManager>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        coordinator: Arc<Coordinator>,
        schema_manager: Arc<SchemaManager>,
    ) -> Self {
        Self {
            config,
            coordinator,
            schema_manager,
            startup_time: chrono::Utc::now(),
        }
    }
}
