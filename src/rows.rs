// 📄 Row Loading - Delimited feed files → key-value records
// The reconcilers consume rows as string maps keyed by the source's own
// column names; this is the only place raw feed files are parsed.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// One feed row: column name → value
pub type Row = HashMap<String, String>;

/// Read a delimited file with a header row into key-value records
pub fn read_delimited<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open feed file: {:?}", path))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read header row: {:?}", path))?
        .clone();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read row: {:?}", path))?;
        let mut row = Row::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), value.to_string());
        }
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Row>> {
    read_delimited(path, b',')
}

pub fn read_tsv<P: AsRef<Path>>(path: P) -> Result<Vec<Row>> {
    read_delimited(path, b'\t')
}

/// Fetch a column value, treating a missing column and an empty value
/// the same way
pub fn field<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    match row.get(column) {
        Some(value) if !value.is_empty() => Some(value.as_str()),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
