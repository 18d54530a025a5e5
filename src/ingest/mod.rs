//! Ingestion Module - CSV files into relational tables
//!
//! Pipeline stages:
//! - Source reading (header + rows, shape enforcement)
//! - Type inference over full column data
//! - Schema building (name normalization, nullability)
//! - Table reconciliation (create / append / replace)
//! - Transactional batch loading

pub mod inference;
pub mod loader;
pub mod orchestrator;
pub mod reader;
pub mod reconcile;
pub mod schema;

pub use inference::{infer_column, InferredColumn};
pub use loader::{load_rows, LoadOutcome};
pub use orchestrator::{IngestOptions, IngestionOrchestrator};
pub use reader::{read_source, ParsedSource};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use schema::SchemaBuilder;

use serde::{Deserialize, Serialize};

/// How an ingestion call treats a pre-existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestMode {
    /// Load into the existing table without altering its schema (default).
    Append,
    /// Drop any existing table and rebuild it from the new file.
    Replace,
}

impl Default for IngestMode {
    fn default() -> Self {
        IngestMode::Append
    }
}

/// Outcome of one ingestion call. Built once by the orchestrator and
/// returned to the caller; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    /// Whether the call completed without error.
    pub success: bool,

    /// Destination table (sanitized name).
    pub table_name: String,

    /// Rows durably committed across all batches.
    pub rows_inserted: u64,

    /// Rows rejected for a field-count mismatch against the header.
    pub rows_skipped: u64,

    /// Column names of the effective destination schema.
    pub columns: Vec<String>,

    /// Human-readable failure detail, if any.
    pub error: Option<String>,

    /// Unique id for this ingestion run.
    pub run_id: String,

    /// Wall-clock duration of the call.
    pub elapsed_ms: u64,
}
