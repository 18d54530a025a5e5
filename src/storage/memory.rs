//! In-memory implementation of the storage abstraction.
//!
//! Backs the integration tests and offline runs. Mirrors the transactional
//! contract of the PostgreSQL store: a batch writer buffers rows and applies
//! them atomically on commit.

use crate::error::{CsvqlError, Result};
use crate::storage::{
    BatchWriter, QueryRows, TableInfo, TablePreview, TableSchema, TableStore,
};
use crate::value::{ColumnType, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Vec<Value>>,
}

type Tables = Arc<Mutex<BTreeMap<String, MemTable>>>;

#[derive(Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows currently stored in a table. Test helper.
    pub fn row_count(&self, name: &str) -> Option<u64> {
        let tables = self.tables.lock().unwrap();
        tables.get(name).map(|t| t.rows.len() as u64)
    }
}

fn check_value(value: &Value, column_type: ColumnType, nullable: bool) -> Result<()> {
    let ok = match value {
        Value::Null => nullable,
        Value::Integer(_) => column_type == ColumnType::Integer,
        Value::Real(_) => column_type == ColumnType::Real,
        Value::Boolean(_) => column_type == ColumnType::Boolean,
        Value::Timestamp(_) => column_type == ColumnType::Timestamp,
        Value::Text(_) => column_type == ColumnType::Text,
    };
    if ok {
        Ok(())
    } else if value.is_null() {
        Err(CsvqlError::Store(
            "null value in non-nullable column".to_string(),
        ))
    } else {
        Err(CsvqlError::Store(format!(
            "value {:?} does not match column type {}",
            value, column_type
        )))
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.tables.lock().unwrap().contains_key(name))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .values()
            .map(|t| TableInfo {
                name: t.schema.table_name.clone(),
                columns: t.schema.columns.clone(),
            })
            .collect())
    }

    async fn table_schema(&self, name: &str) -> Result<Option<TableSchema>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(name).map(|t| t.schema.clone()))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.contains_key(&schema.table_name) {
            return Err(CsvqlError::Store(format!(
                "table '{}' already exists",
                schema.table_name
            )));
        }
        tables.insert(
            schema.table_name.clone(),
            MemTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.tables.lock().unwrap().remove(name);
        Ok(())
    }

    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>> {
        {
            let tables = self.tables.lock().unwrap();
            if !tables.contains_key(&schema.table_name) {
                return Err(CsvqlError::Store(format!(
                    "table '{}' does not exist",
                    schema.table_name
                )));
            }
        }
        Ok(Box::new(MemBatchWriter {
            tables: Arc::clone(&self.tables),
            schema: schema.clone(),
            buffered: Vec::new(),
        }))
    }

    async fn preview(&self, name: &str, limit: usize) -> Result<TablePreview> {
        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(name)
            .ok_or_else(|| CsvqlError::Store(format!("table '{}' does not exist", name)))?;

        let rows = table
            .rows
            .iter()
            .take(limit)
            .map(|row| row.iter().map(|v| v.to_json()).collect())
            .collect();

        Ok(TablePreview {
            table_name: name.to_string(),
            columns: table.schema.column_names(),
            rows,
            total_rows: table.rows.len() as u64,
        })
    }

    async fn select(&self, _sql: &str, _max_rows: usize) -> Result<QueryRows> {
        Err(CsvqlError::Query(
            "raw SQL queries require the PostgreSQL store".to_string(),
        ))
    }
}

struct MemBatchWriter {
    tables: Tables,
    schema: TableSchema,
    buffered: Vec<Vec<Value>>,
}

#[async_trait]
impl BatchWriter for MemBatchWriter {
    async fn insert(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.schema.columns.len() {
            return Err(CsvqlError::Store(format!(
                "row has {} values but table '{}' has {} columns",
                row.len(),
                self.schema.table_name,
                self.schema.columns.len()
            )));
        }
        for (value, column) in row.iter().zip(self.schema.columns.iter()) {
            check_value(value, column.column_type, column.nullable)?;
        }
        self.buffered.push(row.to_vec());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&self.schema.table_name).ok_or_else(|| {
            CsvqlError::Store(format!(
                "table '{}' dropped while a batch was open",
                self.schema.table_name
            ))
        })?;
        let n = self.buffered.len() as u64;
        table.rows.extend(self.buffered);
        Ok(n)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
