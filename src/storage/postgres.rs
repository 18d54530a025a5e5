//! PostgreSQL implementation of the storage abstraction, built on sqlx.

use crate::error::{CsvqlError, Result};
use crate::storage::{
    BatchWriter, ColumnDef, QueryRows, TableInfo, TablePreview, TableSchema, TableStore,
};
use crate::value::{ColumnType, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row, Transaction, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

/// Quote an identifier for inclusion in a SQL statement.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and verify the connection with a probe query.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_columns(&self, name: &str) -> Result<Vec<ColumnDef>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let col_name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                let is_nullable: String = row.get("is_nullable");
                ColumnDef {
                    name: col_name,
                    column_type: ColumnType::from_sql_type(&data_type),
                    nullable: is_nullable == "YES",
                }
            })
            .collect())
    }
}

/// Decode one cell of an arbitrary result row into JSON, driven by the
/// column's reported Postgres type. Unrecognized types come back as null.
fn pg_cell_to_json(row: &PgRow, idx: usize) -> serde_json::Value {
    let type_name = row.column(idx).type_info().name().to_uppercase();
    match type_name.as_str() {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::json!(v))
            .unwrap_or(serde_json::Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(serde_json::Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(serde_json::Value::Null),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
        other => {
            // Last resort: many Postgres types decode as text.
            match row.try_get::<Option<String>, _>(idx) {
                Ok(Some(s)) => serde_json::Value::String(s),
                Ok(None) => serde_json::Value::Null,
                Err(_) => {
                    warn!(column_type = other, "cannot decode column type, returning null");
                    serde_json::Value::Null
                }
            }
        }
    }
}

#[async_trait]
impl TableStore for PostgresStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            ) AS present
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>("present"))
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables: Vec<TableInfo> = Vec::new();
        for row in &rows {
            let table_name: String = row.get("table_name");
            let column = ColumnDef {
                name: row.get("column_name"),
                column_type: ColumnType::from_sql_type(&row.get::<String, _>("data_type")),
                nullable: row.get::<String, _>("is_nullable") == "YES",
            };
            match tables.last_mut() {
                Some(last) if last.name == table_name => last.columns.push(column),
                _ => tables.push(TableInfo {
                    name: table_name,
                    columns: vec![column],
                }),
            }
        }
        Ok(tables)
    }

    async fn table_schema(&self, name: &str) -> Result<Option<TableSchema>> {
        let columns = self.load_columns(name).await?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(TableSchema {
            table_name: name.to_string(),
            columns,
        }))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let columns = schema
            .columns
            .iter()
            .map(|c| {
                let null_clause = if c.nullable { "" } else { " NOT NULL" };
                format!(
                    "{} {}{}",
                    quote_ident(&c.name),
                    c.column_type.sql_type(),
                    null_clause
                )
            })
            .join(", ");

        let ddl = format!(
            "CREATE TABLE {} ({})",
            quote_ident(&schema.table_name),
            columns
        );
        debug!(table = %schema.table_name, "creating table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let ddl = format!("DROP TABLE IF EXISTS {}", quote_ident(name));
        debug!(table = %name, "dropping table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>> {
        let tx = self.pool.begin().await?;

        let column_list = schema
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .join(", ");
        let placeholders = (1..=schema.columns.len())
            .map(|i| format!("${}", i))
            .join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&schema.table_name),
            column_list,
            placeholders
        );

        Ok(Box::new(PgBatchWriter {
            tx,
            insert_sql,
            schema: schema.clone(),
            rows_written: 0,
        }))
    }

    async fn preview(&self, name: &str, limit: usize) -> Result<TablePreview> {
        let schema = self.table_schema(name).await?.ok_or_else(|| {
            CsvqlError::Store(format!("table '{}' does not exist", name))
        })?;

        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_ident(name),
            limit
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let data = rows
            .iter()
            .map(|row| {
                (0..schema.columns.len())
                    .map(|idx| pg_cell_to_json(row, idx))
                    .collect()
            })
            .collect();

        let count_sql = format!("SELECT COUNT(*) AS n FROM {}", quote_ident(name));
        let total: i64 = sqlx::query(&count_sql)
            .fetch_one(&self.pool)
            .await?
            .get("n");

        Ok(TablePreview {
            table_name: name.to_string(),
            columns: schema.column_names(),
            rows: data,
            total_rows: total as u64,
        })
    }

    async fn select(&self, sql: &str, max_rows: usize) -> Result<QueryRows> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            None => Vec::new(),
        };

        let data = rows
            .iter()
            .take(max_rows)
            .map(|row| (0..columns.len()).map(|idx| pg_cell_to_json(row, idx)).collect())
            .collect();

        Ok(QueryRows {
            columns,
            rows: data,
        })
    }
}

struct PgBatchWriter {
    tx: Transaction<'static, Postgres>,
    insert_sql: String,
    schema: TableSchema,
    rows_written: u64,
}

#[async_trait]
impl BatchWriter for PgBatchWriter {
    async fn insert(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.schema.columns.len() {
            return Err(CsvqlError::Store(format!(
                "row has {} values but table '{}' has {} columns",
                row.len(),
                self.schema.table_name,
                self.schema.columns.len()
            )));
        }

        let mut query = sqlx::query(&self.insert_sql);
        for (value, column) in row.iter().zip(self.schema.columns.iter()) {
            query = match value {
                Value::Integer(i) => query.bind(*i),
                Value::Real(f) => query.bind(*f),
                Value::Boolean(b) => query.bind(*b),
                Value::Timestamp(ts) => query.bind(*ts),
                Value::Text(s) => query.bind(s.clone()),
                // Nulls must be typed for the wire protocol.
                Value::Null => match column.column_type {
                    ColumnType::Integer => query.bind(Option::<i64>::None),
                    ColumnType::Real => query.bind(Option::<f64>::None),
                    ColumnType::Boolean => query.bind(Option::<bool>::None),
                    ColumnType::Timestamp => query.bind(Option::<NaiveDateTime>::None),
                    ColumnType::Text => query.bind(Option::<String>::None),
                },
            };
        }

        query.execute(&mut *self.tx).await?;
        self.rows_written += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<u64> {
        self.tx.commit().await?;
        Ok(self.rows_written)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
