use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use polyquery::config::{AppConfig, CliArgs};
use polyquery::coordinator::Coordinator;
use polyquery::db::db_pool::DuckDbPools;
use polyquery::db::executor::ExecutorRegistry;
use polyquery::db::multi_db_pool::MultiDbConnectionManager;
use polyquery::db::schema_manager::SchemaManager;
use polyquery::llm::LlmManager;
use polyquery::util::logging::init_tracing;
use polyquery::web;
use polyquery::web::state::AppState;

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

    // Ensure data directory exists
    let data_dir = PathBuf::from(&config.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
    }

    let pools = Arc::new(DuckDbPools::default());
    let connections = Arc::new(MultiDbConnectionManager::from_config(
        data_dir.clone(),
        &config.databases,
    ));
    let schema_manager = Arc::new(SchemaManager::new(
        Arc::clone(&connections),
        Arc::clone(&pools),
    ));

    info!("Initializing schema cache");
    if let Err(e) = schema_manager.refresh_cache().await {
        error!("Failed to initialize schema cache: {}", e);
        // Continue anyway, it can be refreshed through the API
    }

    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = Arc::new(LlmManager::new(&config.llm)?);

    let coordinator = Arc::new(Coordinator::new(
        schema_manager.clone(),
        llm_manager,
        connections,
        Arc::new(ExecutorRegistry::with_duckdb(pools)),
        config.coordinator.clone(),
    )?);

    if let Some(question) = &args.question {
        let cancel = CancellationToken::new();
        let ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c.cancel();
            }
        });

        let answer = coordinator.ask(question, &cancel).await?;
        println!("{}", answer.answer);
        if !answer.sources.is_empty() {
            println!();
            println!("Sources: {}", answer.sources.join(", "));
        }
        return Ok(());
    }

    let app_state = Arc::new(AppState::new(config.clone(), coordinator, schema_manager));

    // Start the web server
    info!("Starting polyquery server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
