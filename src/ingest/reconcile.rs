//! Table Reconciler - maps a derived schema onto the live store.

use crate::error::{CsvqlError, Result};
use crate::ingest::IngestMode;
use crate::storage::{TableSchema, TableStore};
use itertools::Itertools;
use tracing::{info, warn};

/// Result of reconciliation: the schema the loader must target, plus what
/// happened to the destination table.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Schema rows are converted against. For append into an existing table
    /// this is the table's own schema, not the derived one.
    pub effective: TableSchema,
    pub created: bool,
    pub replaced: bool,
}

/// Apply the create / replace / append policy for one ingestion call.
///
/// Store-level create/drop failures propagate out and abort the call before
/// any rows load; no half-applied schema is left behind.
pub async fn reconcile(
    store: &dyn TableStore,
    derived: &TableSchema,
    mode: IngestMode,
) -> Result<ReconcileOutcome> {
    let table = &derived.table_name;
    let exists = store.table_exists(table).await?;

    if !exists {
        info!(table = %table, "creating table");
        store.create_table(derived).await?;
        return Ok(ReconcileOutcome {
            effective: derived.clone(),
            created: true,
            replaced: false,
        });
    }

    match mode {
        IngestMode::Replace => {
            warn!(table = %table, "replacing existing table");
            store.drop_table(table).await?;
            store.create_table(derived).await?;
            Ok(ReconcileOutcome {
                effective: derived.clone(),
                created: true,
                replaced: true,
            })
        }
        IngestMode::Append => {
            let existing = store.table_schema(table).await?.ok_or_else(|| {
                CsvqlError::Store(format!(
                    "table '{}' disappeared during reconciliation",
                    table
                ))
            })?;

            // Every incoming column must already exist; extra file columns
            // are an error, never silently dropped. Columns the file lacks
            // load as null.
            let unknown: Vec<&str> = derived
                .columns
                .iter()
                .filter(|c| existing.column(&c.name).is_none())
                .map(|c| c.name.as_str())
                .collect();

            if !unknown.is_empty() {
                return Err(CsvqlError::SchemaConflict(format!(
                    "table '{}' has no column(s) {} present in the file",
                    table,
                    unknown.iter().map(|c| format!("'{}'", c)).join(", ")
                )));
            }

            info!(table = %table, "appending into existing table");
            Ok(ReconcileOutcome {
                effective: existing,
                created: false,
                replaced: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ColumnDef, MemoryStore};
    use crate::value::ColumnType;

    fn schema(table: &str, cols: &[(&str, ColumnType, bool)]) -> TableSchema {
        TableSchema {
            table_name: table.to_string(),
            columns: cols
                .iter()
                .map(|(name, ty, nullable)| ColumnDef {
                    name: name.to_string(),
                    column_type: *ty,
                    nullable: *nullable,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn creates_missing_table() {
        let store = MemoryStore::new();
        let derived = schema("t", &[("a", ColumnType::Integer, false)]);
        let outcome = reconcile(&store, &derived, IngestMode::Append).await.unwrap();
        assert!(outcome.created);
        assert!(!outcome.replaced);
        assert!(store.table_exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn replace_rebuilds_schema() {
        let store = MemoryStore::new();
        let original = schema("t", &[("a", ColumnType::Integer, false)]);
        store.create_table(&original).await.unwrap();

        let derived = schema("t", &[("b", ColumnType::Text, true)]);
        let outcome = reconcile(&store, &derived, IngestMode::Replace).await.unwrap();
        assert!(outcome.replaced);
        assert_eq!(outcome.effective, derived);

        let live = store.table_schema("t").await.unwrap().unwrap();
        assert_eq!(live.columns[0].name, "b");
    }

    #[tokio::test]
    async fn append_targets_existing_schema() {
        let store = MemoryStore::new();
        let existing = schema(
            "t",
            &[("a", ColumnType::Text, true), ("b", ColumnType::Integer, true)],
        );
        store.create_table(&existing).await.unwrap();

        // File carries only column a, with a narrower inferred type.
        let derived = schema("t", &[("a", ColumnType::Integer, false)]);
        let outcome = reconcile(&store, &derived, IngestMode::Append).await.unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.effective, existing);
    }

    #[tokio::test]
    async fn append_rejects_unknown_columns() {
        let store = MemoryStore::new();
        let existing = schema("t", &[("a", ColumnType::Integer, false)]);
        store.create_table(&existing).await.unwrap();

        let derived = schema(
            "t",
            &[("a", ColumnType::Integer, false), ("extra", ColumnType::Text, true)],
        );
        let err = reconcile(&store, &derived, IngestMode::Append)
            .await
            .unwrap_err();
        assert!(matches!(err, CsvqlError::SchemaConflict(_)));
        assert!(err.to_string().contains("extra"));
    }
}
