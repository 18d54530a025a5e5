//! Source reader - parses a delimited text file into header and raw rows.

use crate::config::CsvEncoding;
use crate::error::{CsvqlError, Result};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, warn};

/// Parsed contents of a delimited source file.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    /// Header fields, in file order, as written (not yet normalized).
    pub headers: Vec<String>,

    /// Data rows whose field count matches the header.
    pub rows: Vec<Vec<String>>,

    /// Rows rejected because their field count did not match the header.
    pub rows_skipped: u64,
}

/// Decode raw file bytes under the configured encoding.
fn decode(bytes: Vec<u8>, encoding: CsvEncoding) -> Result<String> {
    match encoding {
        CsvEncoding::Utf8 => String::from_utf8(bytes)
            .map_err(|e| CsvqlError::SourceRead(format!("file is not valid UTF-8: {}", e))),
        // Latin-1 maps each byte to the same Unicode codepoint.
        CsvEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Read and parse a source file.
///
/// Fails (without touching the store) when the file is missing, unreadable,
/// empty, or has no header row. Rows with too few or too many fields are
/// skipped and counted, never truncated or padded.
pub fn read_source(path: &Path, delimiter: u8, encoding: CsvEncoding) -> Result<ParsedSource> {
    let bytes = std::fs::read(path).map_err(|e| {
        CsvqlError::SourceRead(format!("cannot read '{}': {}", path.display(), e))
    })?;

    if bytes.is_empty() {
        return Err(CsvqlError::SourceRead(format!(
            "'{}' is empty",
            path.display()
        )));
    }

    let text = decode(bytes, encoding)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvqlError::SourceRead(format!("cannot read header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(CsvqlError::SourceRead(format!(
            "'{}' has no usable header row",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    let mut rows_skipped = 0u64;

    for (idx, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| CsvqlError::SourceRead(format!("row {}: {}", idx + 1, e)))?;

        if record.len() != headers.len() {
            warn!(
                row = idx + 1,
                fields = record.len(),
                expected = headers.len(),
                "skipping row with wrong field count"
            );
            rows_skipped += 1;
            continue;
        }

        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    debug!(
        rows = rows.len(),
        skipped = rows_skipped,
        columns = headers.len(),
        "parsed source file"
    );

    Ok(ParsedSource {
        headers,
        rows,
        rows_skipped,
    })
}
