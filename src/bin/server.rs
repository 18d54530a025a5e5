// Standalone HTTP API server for csvql.

use anyhow::Context;
use csvql::config::Config;
use csvql::ingest::{IngestOptions, IngestionOrchestrator};
use csvql::query::QueryService;
use csvql::server::{serve, AppState};
use csvql::storage::{PostgresStore, TableStore};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    println!("Starting csvql API server...");
    println!(
        "Listening on http://{}:{}",
        config.server_host, config.server_port
    );

    let store = PostgresStore::connect(&config.database_url)
        .await
        .context("database connection failed (check DATABASE_URL)")?;
    let store: Arc<dyn TableStore> = Arc::new(store);

    let orchestrator = IngestionOrchestrator::new(store.clone(), IngestOptions::from(&config));
    let query = QueryService::new(store);

    let state = Arc::new(AppState {
        orchestrator,
        query,
        debug: config.debug,
    });

    info!(host = %config.server_host, port = config.server_port, "server starting");
    serve(&config, state).await
}
