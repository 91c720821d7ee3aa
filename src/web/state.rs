use crate::config::AppConfig;
use crate::db::db_pool::SqliteConnectionManager;
use crate::db::schema::NORTHWIND_SCHEMA;
use crate::llm::LlmManager;
use crate::notify::EmailNotifier;
use r2d2::Pool;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Pool<SqliteConnectionManager>,
    pub llm_manager: Arc<LlmManager>,
    /// None when reply emails are disabled in configuration.
    pub notifier: Option<EmailNotifier>,
    pub output_dir: PathBuf,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<SqliteConnectionManager>,
        llm_manager: LlmManager,
        notifier: Option<EmailNotifier>,
    ) -> Self {
        let output_dir = PathBuf::from(&config.output_dir);
        Self {
            config,
            db_pool,
            llm_manager: Arc::new(llm_manager),
            notifier,
            output_dir,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Schema description handed to the SQL generation prompt.
    pub fn schema(&self) -> &'static str {
        NORTHWIND_SCHEMA
    }
}
