//! Schema Builder - turns inferred column types into a table definition.

use crate::error::{CsvqlError, Result};
use crate::ingest::inference::InferredColumn;
use crate::storage::{ColumnDef, TableSchema};
use std::collections::HashSet;

/// Builds [`TableSchema`] values from raw headers and inference results.
/// Pure; never touches the store.
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Normalize a raw name into a safe SQL identifier: lowercase,
    /// non-alphanumerics replaced with underscores, a leading digit prefixed
    /// with an underscore. Returns an empty string when nothing survives.
    pub fn normalize_identifier(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        for ch in raw.trim().chars() {
            if ch.is_ascii_alphanumeric() {
                out.extend(ch.to_lowercase());
            } else {
                out.push('_');
            }
        }
        let out = out.trim_matches('_').to_string();
        if out.is_empty() {
            return out;
        }
        if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            format!("_{}", out)
        } else {
            out
        }
    }

    /// Sanitize a user-supplied table name. Fails when nothing identifier-like
    /// remains after normalization.
    pub fn table_name(raw: &str) -> Result<String> {
        let name = Self::normalize_identifier(raw);
        if name.is_empty() {
            return Err(CsvqlError::SchemaConflict(format!(
                "table name '{}' does not normalize to a usable identifier",
                raw
            )));
        }
        Ok(name)
    }

    /// Normalize header names in file order, resolving empties with
    /// positional placeholders and collisions with numeric suffixes in
    /// encounter order.
    pub fn column_names(headers: &[String]) -> Vec<String> {
        let mut taken: HashSet<String> = HashSet::new();
        let mut names = Vec::with_capacity(headers.len());

        for (idx, header) in headers.iter().enumerate() {
            let mut base = Self::normalize_identifier(header);
            if base.is_empty() {
                base = format!("column_{}", idx);
            }

            let name = if taken.contains(&base) {
                let mut suffix = 2usize;
                loop {
                    let candidate = format!("{}_{}", base, suffix);
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                    suffix += 1;
                }
            } else {
                base
            };

            taken.insert(name.clone());
            names.push(name);
        }

        names
    }

    /// Assemble the derived table schema from headers and per-column
    /// inference results. Column order follows the file.
    pub fn build(
        table_name: &str,
        headers: &[String],
        inferred: &[InferredColumn],
    ) -> Result<TableSchema> {
        debug_assert_eq!(headers.len(), inferred.len());

        let columns = Self::column_names(headers)
            .into_iter()
            .zip(inferred.iter())
            .map(|(name, col)| ColumnDef {
                name,
                column_type: col.column_type,
                nullable: col.nullable,
            })
            .collect();

        Ok(TableSchema {
            table_name: Self::table_name(table_name)?,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_case_and_punctuation() {
        assert_eq!(
            SchemaBuilder::normalize_identifier("Order ID (internal)"),
            "order_id__internal"
        );
        assert_eq!(SchemaBuilder::normalize_identifier("Price$USD"), "price_usd");
    }

    #[test]
    fn leading_digit_gets_underscore_prefix() {
        assert_eq!(SchemaBuilder::normalize_identifier("2024_sales"), "_2024_sales");
    }

    #[test]
    fn empty_headers_get_positional_placeholders() {
        let names = SchemaBuilder::column_names(&headers(&["a", "", "c"]));
        assert_eq!(names, vec!["a", "column_1", "c"]);
    }

    #[test]
    fn collisions_get_suffixes_in_encounter_order() {
        let names = SchemaBuilder::column_names(&headers(&["id", "ID", "Id", "id_2"]));
        assert_eq!(names, vec!["id", "id_2", "id_3", "id_2_2"]);
    }

    #[test]
    fn table_name_rejects_unusable_input() {
        assert!(SchemaBuilder::table_name("!!!").is_err());
        assert_eq!(SchemaBuilder::table_name("My Table").unwrap(), "my_table");
    }

    #[test]
    fn builds_schema_in_file_order() {
        let inferred = vec![
            InferredColumn {
                column_type: ColumnType::Integer,
                nullable: false,
            },
            InferredColumn {
                column_type: ColumnType::Text,
                nullable: true,
            },
        ];
        let schema =
            SchemaBuilder::build("Sales 2024", &headers(&["Order ID", "Note"]), &inferred)
                .unwrap();
        assert_eq!(schema.table_name, "sales_2024");
        assert_eq!(schema.columns[0].name, "order_id");
        assert_eq!(schema.columns[0].column_type, ColumnType::Integer);
        assert!(schema.columns[1].nullable);
    }
}
