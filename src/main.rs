use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod ingest;
mod llm;
mod resolve;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(&config.logging.format);

    // Ensure data directory exists
    let data_dir = PathBuf::from(&config.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
    }

    info!("Opening DuckDB at {}", config.database.connection_string);
    let pool = db::build_pool(&config.database)?;

    let llm_manager = LlmManager::new(&config.llm);
    if !llm_manager.is_configured() {
        info!("No text-generation provider configured, /api/ai-query will use rule-based resolution");
    }

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(config, pool, llm_manager, data_dir));

    if let Err(e) = web::run_server(web_config, app_state).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
