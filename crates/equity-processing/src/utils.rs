//! Shared utilities for the equity pipeline.
//!
//! This module contains common helper functions used across multiple stages:
//! column lookup, value parsing (numbers, dates, truthy flags) and the
//! percentile computation used by the outlier detector.

use crate::error::{EquityError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

// =============================================================================
// Column Access
// =============================================================================

/// Check whether a table has a column with the given name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Get a column as a Series, or a schema error naming the column.
pub fn require_series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| EquityError::missing_column(name))
}

/// Owned string form of every cell; nulls stay `None`.
pub fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let as_str = series.cast(&DataType::String)?;
    Ok(as_str
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters commonly used in numeric formatting that should be stripped.
pub const NUMERIC_FORMAT_CHARS: [char; 6] = [',', '$', '%', '€', '£', ' '];

/// Common error/missing value markers in data.
pub const ERROR_MARKERS: [&str; 8] = [
    "error", "unknown", "n/a", "na", "null", "missing", "none", "#n/a",
];

/// Strings read as a positive flag in indicator columns.
pub const TRUTHY_MARKERS: [&str; 7] = ["true", "yes", "y", "t", "positive", "pos", "detected"];

/// Clean a string for numeric parsing by removing formatting characters.
///
/// ```rust,ignore
/// assert_eq!(clean_numeric_string("$1,234.56"), "1234.56");
/// assert_eq!(clean_numeric_string("  42%  "), "42");
/// ```
pub fn clean_numeric_string(s: &str) -> String {
    let mut result = s.trim().to_string();
    for c in NUMERIC_FORMAT_CHARS {
        result = result.replace(c, "");
    }
    result
}

/// Check if a string is an error/missing value marker.
pub fn is_error_marker(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    ERROR_MARKERS.iter().any(|&marker| lower == marker)
}

/// Try to parse a string as a numeric value (f64).
///
/// Handles common formatting like currency symbols, percentages, and thousands separators.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Whether a string cell counts as a positive flag.
///
/// Numbers are truthy when non-zero; otherwise the value must match one of
/// [`TRUTHY_MARKERS`]. Everything else, including "negative" or
/// "not detected", is false.
pub fn is_truthy_str(s: &str) -> bool {
    let trimmed = s.trim();
    if let Some(num) = parse_numeric_string(trimmed) {
        return num != 0.0 && !num.is_nan();
    }
    let lower = trimmed.to_ascii_lowercase();
    TRUTHY_MARKERS.iter().any(|&marker| lower == marker)
}

/// Read a column as binary flags. Nulls are false.
pub fn indicator_flags(series: &Series) -> Result<Vec<bool>> {
    let dtype = series.dtype();
    if matches!(dtype, DataType::Boolean) {
        return Ok(series
            .bool()?
            .into_iter()
            .map(|v| v.unwrap_or(false))
            .collect());
    }

    if is_numeric_dtype(dtype) {
        let as_float = series.cast(&DataType::Float64)?;
        return Ok(as_float
            .f64()?
            .into_iter()
            .map(|v| v.map(|x| x != 0.0 && !x.is_nan()).unwrap_or(false))
            .collect());
    }

    let as_str = series.cast(&DataType::String)?;
    Ok(as_str
        .str()?
        .into_iter()
        .map(|v| v.map(is_truthy_str).unwrap_or(false))
        .collect())
}

// =============================================================================
// Date Utilities
// =============================================================================

/// Day number of 1970-01-01 counted from 0001-01-01 (CE).
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a date string, accepting plain dates, ISO datetimes and RFC 3339.
///
/// Datetimes are truncated to their date. Returns `None` for empty or
/// unrecognized input.
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Convert a Polars `Date` physical value (days since the Unix epoch).
pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
}

// =============================================================================
// Statistics Utilities
// =============================================================================

/// Percentile of already-sorted values with linear interpolation between
/// the closest ranks (`pos = p/100 * (n - 1)`).
///
/// Returns `None` for an empty slice.
pub fn percentile_linear(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let fraction = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Percentage `100 * part / whole`, or 0 for an empty whole.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string("$1,234.56"), Some(1234.56));
        assert_eq!(parse_numeric_string(" 42 "), Some(42.0));
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("thirty"), None);
    }

    #[test]
    fn test_is_error_marker() {
        assert!(is_error_marker("N/A"));
        assert!(is_error_marker(" null "));
        assert!(!is_error_marker("27"));
    }

    #[test]
    fn test_is_truthy_str() {
        assert!(is_truthy_str("1"));
        assert!(is_truthy_str("TRUE"));
        assert!(is_truthy_str("Detected"));
        assert!(is_truthy_str("2.0"));
        assert!(!is_truthy_str("0"));
        assert!(!is_truthy_str("false"));
        assert!(!is_truthy_str("not detected"));
        assert!(!is_truthy_str(""));
    }

    #[test]
    fn test_indicator_flags_by_dtype() {
        let bools = Series::new("b".into(), &[Some(true), None, Some(false)]);
        assert_eq!(indicator_flags(&bools).unwrap(), vec![true, false, false]);

        let ints = Series::new("i".into(), &[Some(0i64), Some(3), None]);
        assert_eq!(indicator_flags(&ints).unwrap(), vec![false, true, false]);

        let strs = Series::new("s".into(), &[Some("yes"), Some("no"), None]);
        assert_eq!(indicator_flags(&strs).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn test_parse_date_str_formats() {
        let expected = NaiveDate::from_ymd_opt(2028, 3, 1).unwrap();
        assert_eq!(parse_date_str("2028-03-01"), Some(expected));
        assert_eq!(parse_date_str("2028/03/01"), Some(expected));
        assert_eq!(parse_date_str("03/01/2028"), Some(expected));
        assert_eq!(parse_date_str("2028-03-01 13:45:00"), Some(expected));
        assert_eq!(parse_date_str("2028-03-01T08:00:00.250"), Some(expected));
        assert_eq!(parse_date_str("2028-03-01T08:00:00+02:00"), Some(expected));
        assert_eq!(parse_date_str("  "), None);
        assert_eq!(parse_date_str("March 1st"), None);
    }

    #[test]
    fn test_date_from_epoch_days() {
        assert_eq!(
            date_from_epoch_days(0),
            NaiveDate::from_ymd_opt(1970, 1, 1)
        );
        assert_eq!(
            date_from_epoch_days(31),
            NaiveDate::from_ymd_opt(1970, 2, 1)
        );
    }

    #[test]
    fn test_percentile_linear_matches_closest_rank_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        // pos = 0.25 * 3 = 0.75 -> 1 + 0.75
        assert_eq!(percentile_linear(&sorted, 25.0), Some(1.75));
        assert_eq!(percentile_linear(&sorted, 75.0), Some(3.25));
        assert_eq!(percentile_linear(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile_linear(&sorted, 100.0), Some(4.0));
        assert_eq!(percentile_linear(&[7.0], 25.0), Some(7.0));
        assert_eq!(percentile_linear(&[], 50.0), None);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(3, 5), 60.0);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
