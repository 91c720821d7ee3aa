use clap::Parser;
use r2d2::Pool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use askmail::config::{AppConfig, CliArgs};
use askmail::db::db_pool::SqliteConnectionManager;
use askmail::llm::LlmManager;
use askmail::notify::EmailNotifier;
use askmail::util::logging::init_tracing;
use askmail::web;
use askmail::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Ensure output directory exists
    let output_dir = PathBuf::from(&config.output_dir);
    if !output_dir.exists() {
        info!("Creating output directory: {}", config.output_dir);
        std::fs::create_dir_all(&output_dir)?;
    }

    // The database file is expected to exist already; queries against a
    // missing file will fail per request, so flag it early.
    if !PathBuf::from(&config.database.path).exists() {
        warn!(
            "Database file {} does not exist; queries will fail until it is provided",
            config.database.path
        );
    }

    info!("Initializing SQLite connection pool for {}", config.database.path);
    let db_manager = SqliteConnectionManager::new(config.database.path.clone());
    let pool = Pool::builder()
        .max_size(config.database.pool_size as u32)
        .build(db_manager)?;

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    // Reply emails are off by default; the pipeline still renders the image
    let notifier = if config.email.enabled {
        info!("Email replies enabled, initializing notifier");
        Some(EmailNotifier::new(&config.email)?)
    } else {
        info!("Email replies disabled");
        None
    };

    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager, notifier));

    // Start the web server
    info!(
        "Starting askmail server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(Box::new(std::io::Error::other(e.to_string()))
                as Box<dyn std::error::Error>);
        }
    }

    Ok(())
}
