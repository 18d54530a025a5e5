//! Read-only query surface over the storage collaborator.
//!
//! No inference logic lives here: listing and preview are pass-throughs to
//! the store, and raw SQL is only forwarded after the SELECT-only guard.

use crate::error::{CsvqlError, Result};
use crate::storage::{QueryRows, TableInfo, TablePreview, TableStore};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_PREVIEW_LIMIT: usize = 10;
pub const MAX_QUERY_ROWS: usize = 10_000;

/// Reject anything that is not a single read-only statement.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| CsvqlError::Query(format!("cannot parse query: {}", e)))?;

    match statements.as_slice() {
        [] => Err(CsvqlError::Query("empty query".to_string())),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(CsvqlError::Query(format!(
            "only SELECT statements are allowed, got {}",
            statement_kind(other)
        ))),
        _ => Err(CsvqlError::Query(
            "multiple statements are not allowed".to_string(),
        )),
    }
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Truncate { .. } => "TRUNCATE",
        _ => "a non-SELECT statement",
    }
}

/// Thin read-only facade handed to the CLI and HTTP server.
pub struct QueryService {
    store: Arc<dyn TableStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        self.store.list_tables().await
    }

    pub async fn preview(&self, table: &str, limit: usize) -> Result<TablePreview> {
        let limit = if limit == 0 { DEFAULT_PREVIEW_LIMIT } else { limit };
        self.store.preview(table, limit).await
    }

    /// Validate and run a raw read-only query.
    pub async fn run_query(&self, sql: &str) -> Result<QueryRows> {
        ensure_read_only(sql)?;
        debug!(sql, "running read-only query");
        self.store.select(sql, MAX_QUERY_ROWS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_passes_the_guard() {
        assert!(ensure_read_only("SELECT * FROM employees WHERE age > 30").is_ok());
        assert!(ensure_read_only("WITH t AS (SELECT 1 AS x) SELECT x FROM t").is_ok());
    }

    #[test]
    fn mutations_are_rejected() {
        assert!(ensure_read_only("DROP TABLE employees").is_err());
        assert!(ensure_read_only("DELETE FROM employees").is_err());
        assert!(ensure_read_only("INSERT INTO t VALUES (1)").is_err());
        assert!(ensure_read_only("UPDATE t SET a = 1").is_err());
    }

    #[test]
    fn multiple_statements_are_rejected() {
        assert!(ensure_read_only("SELECT 1; DROP TABLE employees").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ensure_read_only("not sql at all ;;;").is_err());
        assert!(ensure_read_only("").is_err());
    }
}
