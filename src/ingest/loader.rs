//! Bulk Loader - converts raw rows and writes them in per-batch transactions.

use crate::error::{CsvqlError, Result};
use crate::ingest::inference::parse_value;
use crate::storage::{BatchWriter, TableSchema, TableStore};
use crate::value::Value;
use tracing::{debug, warn};

/// Outcome of a bulk load. On failure, `rows_inserted` still reports the
/// rows durably committed by earlier batches; there is no whole-file
/// atomicity.
#[derive(Debug)]
pub struct LoadOutcome {
    pub rows_inserted: u64,
    pub failure: Option<CsvqlError>,
}

/// Positional mapping from the effective schema to the source columns, or
/// None for columns the file does not carry (loaded as null).
fn column_mapping(
    effective: &TableSchema,
    source_columns: &[String],
) -> Result<Vec<Option<usize>>> {
    let mut mapping = Vec::with_capacity(effective.columns.len());
    for column in &effective.columns {
        let idx = source_columns.iter().position(|name| *name == column.name);
        if idx.is_none() && !column.nullable {
            return Err(CsvqlError::SchemaConflict(format!(
                "file has no column '{}' and the table requires it to be non-null",
                column.name
            )));
        }
        mapping.push(idx);
    }
    Ok(mapping)
}

/// Convert one raw row into typed values in effective-schema order.
///
/// Conversion is not best-effort: the schema was fixed before loading, so a
/// field that fails to parse under its committed type fails the whole call.
fn convert_row(
    effective: &TableSchema,
    mapping: &[Option<usize>],
    row: &[String],
    row_index: usize,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(effective.columns.len());
    for (column, source_idx) in effective.columns.iter().zip(mapping.iter()) {
        let raw = match source_idx {
            Some(idx) => row[*idx].as_str(),
            None => "",
        };

        if raw.trim().is_empty() {
            if !column.nullable {
                return Err(CsvqlError::SchemaConflict(format!(
                    "row {}: empty value for non-nullable column '{}'",
                    row_index + 1,
                    column.name
                )));
            }
            values.push(Value::Null);
            continue;
        }

        match parse_value(raw, column.column_type) {
            Some(value) => values.push(value),
            None => {
                return Err(CsvqlError::SchemaConflict(format!(
                    "row {}: value '{}' is not valid for column '{}' of type {}",
                    row_index + 1,
                    raw,
                    column.name,
                    column.column_type
                )));
            }
        }
    }
    Ok(values)
}

async fn abandon(writer: Box<dyn BatchWriter>) {
    if let Err(e) = writer.rollback().await {
        warn!("batch rollback failed: {}", e);
    }
}

/// Stream rows into the destination table in fixed-size transactional
/// batches. Each batch commits fully or rolls back fully; batches committed
/// before a failure stay committed.
pub async fn load_rows(
    store: &dyn TableStore,
    effective: &TableSchema,
    source_columns: &[String],
    rows: &[Vec<String>],
    batch_size: usize,
) -> LoadOutcome {
    debug_assert!(batch_size > 0);

    let mapping = match column_mapping(effective, source_columns) {
        Ok(m) => m,
        Err(e) => {
            return LoadOutcome {
                rows_inserted: 0,
                failure: Some(e),
            }
        }
    };

    let mut inserted = 0u64;
    let mut writer: Option<Box<dyn BatchWriter>> = None;
    let mut in_batch = 0usize;

    for (row_index, row) in rows.iter().enumerate() {
        let values = match convert_row(effective, &mapping, row, row_index) {
            Ok(v) => v,
            Err(e) => {
                if let Some(w) = writer.take() {
                    abandon(w).await;
                }
                return LoadOutcome {
                    rows_inserted: inserted,
                    failure: Some(e),
                };
            }
        };

        if writer.is_none() {
            writer = match store.begin_batch(effective).await {
                Ok(w) => Some(w),
                Err(e) => {
                    return LoadOutcome {
                        rows_inserted: inserted,
                        failure: Some(e),
                    }
                }
            };
            in_batch = 0;
        }

        if let Err(e) = writer.as_mut().unwrap().insert(&values).await {
            if let Some(w) = writer.take() {
                abandon(w).await;
            }
            return LoadOutcome {
                rows_inserted: inserted,
                failure: Some(e),
            };
        }
        in_batch += 1;

        if in_batch == batch_size {
            let w = writer.take().unwrap();
            match w.commit().await {
                Ok(n) => {
                    inserted += n;
                    debug!(rows = n, total = inserted, "committed batch");
                }
                Err(e) => {
                    return LoadOutcome {
                        rows_inserted: inserted,
                        failure: Some(e),
                    }
                }
            }
        }
    }

    if let Some(w) = writer.take() {
        match w.commit().await {
            Ok(n) => {
                inserted += n;
                debug!(rows = n, total = inserted, "committed final batch");
            }
            Err(e) => {
                return LoadOutcome {
                    rows_inserted: inserted,
                    failure: Some(e),
                }
            }
        }
    }

    LoadOutcome {
        rows_inserted: inserted,
        failure: None,
    }
}
