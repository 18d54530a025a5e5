//! Type Inferencer - derives the narrowest safe storage type for a column.
//!
//! The full column (every non-empty value) is examined, not a sample. A type
//! is chosen only when every value parses under it without loss; any mixture
//! falls back to Text.

use crate::value::{ColumnType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INTEGER_RE: Regex = Regex::new(r"^-?\d+$").unwrap();
}

/// The stable, documented token set for boolean columns. Case-insensitive.
/// Note that a column of pure "1"/"0" still infers Integer, which is tried
/// first in the preference order.
pub const BOOLEAN_TRUE_TOKENS: [&str; 3] = ["true", "1", "yes"];
pub const BOOLEAN_FALSE_TOKENS: [&str; 3] = ["false", "0", "no"];

/// Timestamp formats, attempted in this order. RFC 3339 values (with an
/// offset) are tried before the naive formats.
pub const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

/// Inference outcome for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredColumn {
    pub column_type: ColumnType,
    pub nullable: bool,
}

pub fn parse_integer(s: &str) -> Option<i64> {
    if !INTEGER_RE.is_match(s) {
        return None;
    }
    // Out-of-range literals demote to Real, then Text.
    s.parse::<i64>().ok()
}

pub fn parse_real(s: &str) -> Option<f64> {
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f),
        _ => None,
    }
}

pub fn parse_boolean(s: &str) -> Option<bool> {
    let lower = s.to_lowercase();
    if BOOLEAN_TRUE_TOKENS.contains(&lower.as_str()) {
        return Some(true);
    }
    if BOOLEAN_FALSE_TOKENS.contains(&lower.as_str()) {
        return Some(false);
    }
    None
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in &TIMESTAMP_FORMATS[..2] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    for format in &TIMESTAMP_FORMATS[2..] {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a raw field under a committed column type. Returns None when the
/// value cannot be represented, which the loader treats as a hard failure.
pub fn parse_value(raw: &str, column_type: ColumnType) -> Option<Value> {
    let trimmed = raw.trim();
    match column_type {
        ColumnType::Integer => parse_integer(trimmed).map(Value::Integer),
        ColumnType::Real => parse_real(trimmed).map(Value::Real),
        ColumnType::Boolean => parse_boolean(trimmed).map(Value::Boolean),
        ColumnType::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        ColumnType::Text => Some(Value::Text(raw.to_string())),
    }
}

/// Infer the narrowest type for one column from its full value list.
///
/// Preference order: Integer, Real, Boolean, Timestamp, Text. Empty values
/// mark the column nullable and are excluded from type checks. A column with
/// no non-empty values defaults to Text, nullable.
pub fn infer_column<'a, I>(values: I) -> InferredColumn
where
    I: IntoIterator<Item = &'a str>,
{
    let mut nullable = false;
    let mut saw_value = false;
    let mut all_integer = true;
    let mut all_real = true;
    let mut all_boolean = true;
    let mut all_timestamp = true;

    for raw in values {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            nullable = true;
            continue;
        }
        saw_value = true;

        // The && short-circuits once a candidate is ruled out, so a column
        // that has fallen back to Text only tracks nullability from here on.
        all_integer = all_integer && parse_integer(trimmed).is_some();
        all_real = all_real && parse_real(trimmed).is_some();
        all_boolean = all_boolean && parse_boolean(trimmed).is_some();
        all_timestamp = all_timestamp && parse_timestamp(trimmed).is_some();
    }

    let column_type = if !saw_value {
        ColumnType::Text
    } else if all_integer {
        ColumnType::Integer
    } else if all_real {
        ColumnType::Real
    } else if all_boolean {
        ColumnType::Boolean
    } else if all_timestamp {
        ColumnType::Timestamp
    } else {
        ColumnType::Text
    };

    InferredColumn {
        column_type,
        nullable: nullable || !saw_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(values: &[&str]) -> InferredColumn {
        infer_column(values.iter().copied())
    }

    #[test]
    fn integer_column() {
        let inferred = infer(&["1", "-42", "9007199254740993"]);
        assert_eq!(inferred.column_type, ColumnType::Integer);
        assert!(!inferred.nullable);
    }

    #[test]
    fn integer_overflow_demotes_to_real() {
        let inferred = infer(&["1", "99999999999999999999999999"]);
        assert_eq!(inferred.column_type, ColumnType::Real);
    }

    #[test]
    fn decimals_infer_real() {
        let inferred = infer(&["1", "2.5", "-3e2"]);
        assert_eq!(inferred.column_type, ColumnType::Real);
    }

    #[test]
    fn non_finite_literals_are_text() {
        let inferred = infer(&["1.5", "inf"]);
        assert_eq!(inferred.column_type, ColumnType::Text);
    }

    #[test]
    fn boolean_token_set() {
        let inferred = infer(&["true", "FALSE", "yes"]);
        assert_eq!(inferred.column_type, ColumnType::Boolean);

        let inferred = infer(&["true", "maybe"]);
        assert_eq!(inferred.column_type, ColumnType::Text);
    }

    #[test]
    fn pure_one_zero_prefers_integer() {
        let inferred = infer(&["1", "0", "1"]);
        assert_eq!(inferred.column_type, ColumnType::Integer);
    }

    #[test]
    fn timestamps_across_formats() {
        let inferred = infer(&["2024-01-15", "2024-02-20 10:30:00", "2024-03-01T08:00:00"]);
        assert_eq!(inferred.column_type, ColumnType::Timestamp);
    }

    #[test]
    fn mixed_types_fall_back_to_text() {
        let inferred = infer(&["2024-01-15", "not a date"]);
        assert_eq!(inferred.column_type, ColumnType::Text);
    }

    #[test]
    fn empty_values_mark_nullable() {
        let inferred = infer(&["1", "", "3"]);
        assert_eq!(inferred.column_type, ColumnType::Integer);
        assert!(inferred.nullable);
    }

    #[test]
    fn all_empty_defaults_to_nullable_text() {
        let inferred = infer(&["", "  ", ""]);
        assert_eq!(inferred.column_type, ColumnType::Text);
        assert!(inferred.nullable);
    }

    #[test]
    fn parse_value_respects_committed_type() {
        assert_eq!(
            parse_value("42", ColumnType::Integer),
            Some(Value::Integer(42))
        );
        assert_eq!(parse_value("oops", ColumnType::Integer), None);
        assert_eq!(
            parse_value("anything", ColumnType::Text),
            Some(Value::Text("anything".to_string()))
        );
    }

    #[test]
    fn rfc3339_is_accepted() {
        assert!(parse_timestamp("2024-06-01T12:00:00+02:00").is_some());
    }
}
