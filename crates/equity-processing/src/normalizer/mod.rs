//! Record normalization.
//!
//! Derives the three binary indicator columns the metrics engine works on:
//!
//! - `reported`: any designated output column is present
//! - `test_positive`: any "detected" result column is truthy
//! - `test_ordered`: the collection date is present and not blank
//!
//! Existing columns are left untouched; the indicators are appended to a
//! working copy of the table.

mod indicators;

use crate::config::{ColumnRoles, REPORTED_COLUMN, TEST_ORDERED_COLUMN, TEST_POSITIVE_COLUMN};
use crate::error::{EquityError, Result};
use crate::utils::has_column;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What the normalizer found while deriving indicators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Result columns matched by the detected marker.
    pub detected_columns: Vec<String>,
    /// Designated output columns absent from the table.
    pub missing_output_columns: Vec<String>,
    /// Whether the collection-date column was absent.
    pub collection_column_missing: bool,
    pub reported_count: usize,
    pub positive_count: usize,
    pub ordered_count: usize,
}

/// Appends derived indicator columns to a table.
pub struct RecordNormalizer;

impl RecordNormalizer {
    /// Derive `reported`, `test_positive` and `test_ordered`.
    ///
    /// # Errors
    ///
    /// Returns [`EquityError::Schema`] if the partition date column is absent.
    /// Missing optional columns degrade to all-zero indicators.
    pub fn normalize(
        df: &DataFrame,
        roles: &ColumnRoles,
    ) -> Result<(DataFrame, NormalizationReport)> {
        if !has_column(df, &roles.partition_date_column) {
            return Err(EquityError::missing_column(&roles.partition_date_column));
        }

        info!("Deriving indicator columns for {} records...", df.height());
        let mut report = NormalizationReport::default();

        let (output_columns, missing): (Vec<String>, Vec<String>) = roles
            .output_columns
            .iter()
            .cloned()
            .partition(|name| has_column(df, name));
        if !missing.is_empty() {
            warn!("Output columns not found, ignored for '{}': {:?}", REPORTED_COLUMN, missing);
        }
        report.missing_output_columns = missing;

        report.detected_columns = Self::detected_columns(df, &roles.detected_marker);
        if report.detected_columns.is_empty() {
            warn!(
                "No columns contain '{}'; '{}' will be 0 for every record",
                roles.detected_marker, TEST_POSITIVE_COLUMN
            );
        } else {
            debug!("Result columns: {:?}", report.detected_columns);
        }

        let reported = indicators::any_non_null(df, &output_columns)?;
        let positive = indicators::any_truthy(df, &report.detected_columns)?;
        let ordered = if has_column(df, &roles.collection_date_column) {
            indicators::non_blank(df, &roles.collection_date_column)?
        } else {
            warn!(
                "Collection column '{}' not found; '{}' will be 0 for every record",
                roles.collection_date_column, TEST_ORDERED_COLUMN
            );
            report.collection_column_missing = true;
            vec![0; df.height()]
        };

        report.reported_count = count_set(&reported);
        report.positive_count = count_set(&positive);
        report.ordered_count = count_set(&ordered);

        let mut out = df.clone();
        out.with_column(Series::new(REPORTED_COLUMN.into(), reported))?;
        out.with_column(Series::new(TEST_POSITIVE_COLUMN.into(), positive))?;
        out.with_column(Series::new(TEST_ORDERED_COLUMN.into(), ordered))?;

        debug!(
            "Indicators: {} reported, {} positive, {} ordered",
            report.reported_count, report.positive_count, report.ordered_count
        );

        Ok((out, report))
    }

    /// Columns whose name contains the marker, excluding derived indicators.
    pub fn detected_columns(df: &DataFrame, marker: &str) -> Vec<String> {
        if marker.is_empty() {
            return Vec::new();
        }
        df.get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|name| {
                name.contains(marker)
                    && ![REPORTED_COLUMN, TEST_POSITIVE_COLUMN, TEST_ORDERED_COLUMN]
                        .contains(&name.as_str())
            })
            .collect()
    }
}

fn count_set(flags: &[i32]) -> usize {
    flags.iter().filter(|&&f| f == 1).count()
}
