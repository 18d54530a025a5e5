// CSV ingestion and query CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use csvql::config::Config;
use csvql::ingest::{IngestMode, IngestOptions, IngestionOrchestrator};
use csvql::query::QueryService;
use csvql::server::{serve, AppState};
use csvql::storage::{PostgresStore, TableStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const BANNER: &str = r#"
================================================================================
  csvql - CSV to PostgreSQL ingestion and query tool
  Ingest -> Store -> Query -> Serve
================================================================================"#;

#[derive(Parser)]
#[command(name = "csvql")]
#[command(about = "Ingest CSV files into PostgreSQL and query the stored tables")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test database connectivity
    InitDb,
    /// Ingest a CSV file into a table
    Ingest {
        /// Path to the CSV file to ingest
        #[arg(short, long)]
        file: PathBuf,

        /// Name of the destination table
        #[arg(short, long)]
        table: String,

        /// Replace the table if it already exists (default appends)
        #[arg(long)]
        replace: bool,
    },
    /// List all tables in the database
    Tables,
    /// Preview rows from a table
    Preview {
        /// Table name to preview
        #[arg(short, long)]
        table: String,

        /// Number of rows to display
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Start the HTTP API server
    Serve {
        /// Host to bind (overrides SERVER_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides SERVER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Display the current configuration
    ConfigInfo,
}

fn print_divider() {
    println!("{}", "=".repeat(80));
}

async fn connect(config: &Config) -> Result<Arc<PostgresStore>> {
    let store = PostgresStore::connect(&config.database_url)
        .await
        .context("database connection failed (check DATABASE_URL in your .env)")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let args = Args::parse();

    match args.command {
        Commands::InitDb => init_db(&config).await,
        Commands::Ingest { file, table, replace } => {
            run_ingest(&config, file, table, replace).await
        }
        Commands::Tables => list_tables(&config).await,
        Commands::Preview { table, limit } => preview(&config, table, limit).await,
        Commands::Serve { host, port } => run_serve(config, host, port).await,
        Commands::ConfigInfo => {
            config_info(&config);
            Ok(())
        }
    }
}

async fn init_db(config: &Config) -> Result<()> {
    println!("{}", BANNER);
    println!("[INFO] Testing database connection...");

    connect(config).await?;
    println!("[OK] Database connection successful!");
    println!("[INFO] Connected to: {}", config.database_url);
    print_divider();
    println!("Ready to ingest CSV files and serve queries.");
    Ok(())
}

async fn run_ingest(config: &Config, file: PathBuf, table: String, replace: bool) -> Result<()> {
    println!("{}", BANNER);
    println!("CSV INGESTION STARTED");
    print_divider();
    println!("File:         {}", file.display());
    println!("Target table: {}", table);

    let store = connect(config).await?;

    let mode = if replace {
        IngestMode::Replace
    } else {
        IngestMode::Append
    };

    if store.table_exists(&table).await? {
        if replace {
            println!("[WARN] Table '{}' exists and will be replaced", table);
        } else {
            println!("[WARN] Table '{}' already exists. Data will be appended.", table);
            println!("[INFO] Use --replace to replace the table instead.");
        }
    }

    print_divider();

    let orchestrator =
        IngestionOrchestrator::new(store.clone() as Arc<dyn TableStore>, IngestOptions::from(config));
    let result = orchestrator.ingest(&file, &table, mode).await;

    print_divider();

    if result.success {
        println!("INGESTION SUCCESSFUL");
        println!("  Table:         {}", result.table_name);
        println!("  Rows inserted: {}", result.rows_inserted);
        if result.rows_skipped > 0 {
            println!("  Rows skipped:  {} (wrong field count)", result.rows_skipped);
        }
        println!("  Columns:       {}", result.columns.join(", "));
        println!("  Elapsed:       {} ms", result.elapsed_ms);
        print_divider();
        println!(
            "[INFO] Ready to query! Try: csvql preview -t {}",
            result.table_name
        );
        Ok(())
    } else {
        println!(
            "[ERROR] Ingestion failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        if result.rows_inserted > 0 {
            println!(
                "[WARN] {} row(s) from earlier batches remain committed",
                result.rows_inserted
            );
        }
        std::process::exit(1);
    }
}

async fn list_tables(config: &Config) -> Result<()> {
    println!("Database Tables:");

    let store = connect(config).await?;
    let service = QueryService::new(store as Arc<dyn TableStore>);
    let tables = service.list_tables().await?;

    if tables.is_empty() {
        println!("  (no tables found)");
        return Ok(());
    }

    for table in tables {
        println!("\nTable: {}", table.name);
        println!("  Columns:");
        for col in &table.columns {
            let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
            println!("    - {} ({}) {}", col.name, col.column_type, nullable);
        }
    }
    Ok(())
}

async fn preview(config: &Config, table: String, limit: usize) -> Result<()> {
    println!("Previewing table: {} (limit: {})", table, limit);

    let store = connect(config).await?;
    let service = QueryService::new(store as Arc<dyn TableStore>);
    let result = service.preview(&table, limit).await?;

    println!("Total rows: {}", result.total_rows);
    println!("Showing {} rows:\n", result.rows.len());

    if result.rows.is_empty() {
        println!("  (no data found)");
        return Ok(());
    }

    println!(
        "{}",
        result
            .columns
            .iter()
            .map(|h| format!("{:<15}", truncate(h, 15)))
            .collect::<Vec<_>>()
            .join(" | ")
    );
    println!("{}", "-".repeat(result.columns.len() * 17));

    for row in &result.rows {
        let line = row
            .iter()
            .map(|v| {
                let cell = match v {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{:<15}", truncate(&cell, 15))
            })
            .collect::<Vec<_>>()
            .join(" | ");
        println!("{}", line);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

async fn run_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server_host = host;
    }
    if let Some(port) = port {
        config.server_port = port;
    }

    println!("{}", BANNER);
    println!("[INFO] Starting API server...");

    let store = connect(&config).await?;
    println!("[OK] Database connection successful");

    print_divider();
    println!(
        "  Server URL: http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Endpoints:  /health /api/tables /api/tables/{{name}} /api/ingest /api/query");
    println!("  Press Ctrl+C to stop the server");
    print_divider();

    let orchestrator = IngestionOrchestrator::new(
        store.clone() as Arc<dyn TableStore>,
        IngestOptions::from(&config),
    );
    let query = QueryService::new(store as Arc<dyn TableStore>);

    let state = Arc::new(AppState {
        orchestrator,
        query,
        debug: config.debug,
    });

    info!("server starting");
    serve(&config, state).await
}

fn config_info(config: &Config) {
    println!("Current Configuration:");
    println!("  Database URL: {}", config.database_url);
    println!("  Server Host:  {}", config.server_host);
    println!("  Server Port:  {}", config.server_port);
    println!("  Batch Size:   {}", config.batch_size);
    println!("  Delimiter:    {:?}", config.csv_delimiter as char);
    println!("  Encoding:     {:?}", config.csv_encoding);
    println!("  Debug Mode:   {}", config.debug);
}
