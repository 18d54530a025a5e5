//! Ingestion Orchestrator - sequences one ingestion call end to end.

use crate::config::{Config, CsvEncoding};
use crate::ingest::{
    infer_column, load_rows, read_source, reconcile, IngestMode, IngestionResult, SchemaBuilder,
};
use crate::storage::TableStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Knobs the orchestrator takes from configuration.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub delimiter: u8,
    pub encoding: CsvEncoding,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            delimiter: b',',
            encoding: CsvEncoding::Utf8,
        }
    }
}

impl From<&Config> for IngestOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            delimiter: config.csv_delimiter,
            encoding: config.csv_encoding,
        }
    }
}

/// Coordinates read → infer → build → reconcile → load for one call.
///
/// The store handle is injected by the caller, which owns its lifecycle.
/// Concurrent ingestions into the same table are not coordinated here; the
/// surrounding service must serialize them per table name.
pub struct IngestionOrchestrator {
    store: Arc<dyn TableStore>,
    options: IngestOptions,
}

impl IngestionOrchestrator {
    pub fn new(store: Arc<dyn TableStore>, options: IngestOptions) -> Self {
        Self { store, options }
    }

    /// Run one ingestion. Never panics and never propagates an error past
    /// this boundary: every failure is folded into the returned result.
    pub async fn ingest(
        &self,
        path: &Path,
        table_name: &str,
        mode: IngestMode,
    ) -> IngestionResult {
        let run_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        // Best-effort sanitized name for error results produced before the
        // schema builder has run.
        let display_name = SchemaBuilder::table_name(table_name)
            .unwrap_or_else(|_| table_name.to_string());

        let fail = |table: String,
                    columns: Vec<String>,
                    rows_inserted: u64,
                    rows_skipped: u64,
                    message: String| {
            error!(table = %table, run_id = %run_id, "ingestion failed: {}", message);
            IngestionResult {
                success: false,
                table_name: table,
                rows_inserted,
                rows_skipped,
                columns,
                error: Some(message),
                run_id: run_id.clone(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            }
        };

        info!(
            file = %path.display(),
            table = %display_name,
            ?mode,
            run_id = %run_id,
            "starting ingestion"
        );

        let parsed = match read_source(path, self.options.delimiter, self.options.encoding) {
            Ok(p) => p,
            Err(e) => return fail(display_name, Vec::new(), 0, 0, e.to_string()),
        };

        let inferred: Vec<_> = (0..parsed.headers.len())
            .map(|idx| infer_column(parsed.rows.iter().map(|row| row[idx].as_str())))
            .collect();

        let derived = match SchemaBuilder::build(table_name, &parsed.headers, &inferred) {
            Ok(s) => s,
            Err(e) => {
                return fail(display_name, Vec::new(), 0, parsed.rows_skipped, e.to_string())
            }
        };

        let outcome = match reconcile(self.store.as_ref(), &derived, mode).await {
            Ok(o) => o,
            Err(e) => {
                return fail(
                    derived.table_name.clone(),
                    derived.column_names(),
                    0,
                    parsed.rows_skipped,
                    e.to_string(),
                )
            }
        };

        let source_columns = derived.column_names();
        let load = load_rows(
            self.store.as_ref(),
            &outcome.effective,
            &source_columns,
            &parsed.rows,
            self.options.batch_size,
        )
        .await;

        if let Some(e) = load.failure {
            return fail(
                outcome.effective.table_name.clone(),
                outcome.effective.column_names(),
                load.rows_inserted,
                parsed.rows_skipped,
                e.to_string(),
            );
        }

        info!(
            table = %outcome.effective.table_name,
            rows = load.rows_inserted,
            skipped = parsed.rows_skipped,
            run_id = %run_id,
            "ingestion complete"
        );

        IngestionResult {
            success: true,
            table_name: outcome.effective.table_name.clone(),
            rows_inserted: load.rows_inserted,
            rows_skipped: parsed.rows_skipped,
            columns: outcome.effective.column_names(),
            error: None,
            run_id,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}
