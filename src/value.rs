//! Column types and the typed field values produced at load time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage type of a column.
///
/// Ordered from most to least specific; inference always settles on the
/// narrowest type that represents every non-empty value in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Boolean,
    Timestamp,
    Text,
}

impl ColumnType {
    /// PostgreSQL type name used in CREATE TABLE statements.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map a PostgreSQL `information_schema` data type back to a column type.
    /// Anything unrecognized is treated as Text, the universal fallback.
    pub fn from_sql_type(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "bigint" | "integer" | "smallint" | "int8" | "int4" | "int2" => ColumnType::Integer,
            "double precision" | "real" | "numeric" | "float8" | "float4" => ColumnType::Real,
            "boolean" | "bool" => ColumnType::Boolean,
            s if s.starts_with("timestamp") => ColumnType::Timestamp,
            "date" => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// A single typed field value bound into the store during loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON rendering used by preview and the HTTP API.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Integer(i) => serde_json::json!(i),
            Value::Real(f) => serde_json::json!(f),
            Value::Boolean(b) => serde_json::json!(b),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Null => serde_json::Value::Null,
        }
    }
}
