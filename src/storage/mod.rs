//! Storage abstraction over the relational store.
//!
//! The ingestion pipeline never talks to a database driver directly; it goes
//! through [`TableStore`], which owns table DDL and transactional batch
//! writes. Two implementations exist: PostgreSQL over sqlx, and an in-memory
//! store used by tests and offline runs.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::Result;
use crate::value::{ColumnType, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Full definition of a destination table.
///
/// Column names are unique and the table name is a valid identifier; both
/// are guaranteed by the schema builder before a schema reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Table listing entry returned by [`TableStore::list_tables`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Result of a preview query: the first `limit` rows of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePreview {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Total rows in the table, not just the previewed slice.
    pub total_rows: u64,
}

/// Rows returned by a raw read-only query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Transactional handle for one batch of inserts.
///
/// A batch either commits fully or rolls back fully; the loader opens a new
/// writer per batch, so a mid-file failure leaves earlier batches committed.
#[async_trait]
pub trait BatchWriter: Send {
    /// Queue one row. Values are positional and must match the schema the
    /// writer was opened with.
    async fn insert(&mut self, row: &[Value]) -> Result<()>;

    /// Commit the batch, returning the number of rows written.
    async fn commit(self: Box<Self>) -> Result<u64>;

    /// Roll the batch back, discarding every queued row.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// The relational store collaborator.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn table_exists(&self, name: &str) -> Result<bool>;

    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Schema of an existing table, or None if it does not exist.
    async fn table_schema(&self, name: &str) -> Result<Option<TableSchema>>;

    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    async fn drop_table(&self, name: &str) -> Result<()>;

    /// Open a transactional writer for one batch against `schema`.
    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>>;

    /// First `limit` rows of a table plus its total row count.
    async fn preview(&self, name: &str, limit: usize) -> Result<TablePreview>;

    /// Execute a pre-validated read-only SQL statement. Implementations
    /// without a SQL engine may refuse.
    async fn select(&self, sql: &str, max_rows: usize) -> Result<QueryRows>;
}
