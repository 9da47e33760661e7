//! Loading encounter tables from delimited text files.
//!
//! `.csv` files are comma-separated; `.txt` and `.tsv` files are
//! tab-separated. Spreadsheets are not supported.

use crate::error::{EquityError, Result};
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Rows used to infer column types.
const INFER_SCHEMA_ROWS: usize = 100;

/// Field separator for a file extension.
pub fn separator_for(path: &Path) -> Result<u8> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => Ok(b','),
        "txt" | "tsv" => Ok(b'\t'),
        _ => Err(EquityError::UnsupportedFormat(ext)),
    }
}

/// Load a table, retrying with relaxed quoting and then with cleaned
/// content if the strict read fails.
///
/// # Errors
///
/// - [`EquityError::UnsupportedFormat`] for extensions other than csv/txt/tsv
/// - [`EquityError::Io`] if the file cannot be read
/// - [`EquityError::Polars`] if every strategy fails
pub fn load_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let separator = separator_for(path)?;

    info!("Loading {}", path.display());

    match read_with(path, separator, Some(b'"')) {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Standard loading failed: {}", e),
    }

    match read_with(path, separator, None) {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Loading without quotes failed: {}", e),
    }

    let content = std::fs::read_to_string(path)?;
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(clean_content(&content)))
        .finish()?;
    Ok(df)
}

fn read_with(path: &Path, separator: u8, quote: Option<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(quote),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Collapse doubled quotes and drop blank lines.
fn clean_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
