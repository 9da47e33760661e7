//! Frequency filtering of rare categories.
//!
//! Each category's share is measured against the current table size. Rows
//! are kept only when their category's share is strictly above the
//! threshold. Dropped categories are not merged into an "other" bucket; they
//! are listed in the report so the exclusion is visible.

use crate::error::{EquityError, Result};
use crate::utils::{percentage, require_series, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Count and share of one category value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub value: String,
    pub count: usize,
    /// Share of all rows, in percent.
    pub percentage: f64,
}

/// Outcome of a frequency filter pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyFilterReport {
    pub column: String,
    pub threshold_pct: f64,
    pub rows_before: usize,
    pub rows_after: usize,
    pub retained: Vec<CategoryShare>,
    pub dropped: Vec<CategoryShare>,
    /// Rows removed because the category is null.
    pub null_rows: usize,
}

impl FrequencyFilterReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Names of the dropped categories.
    pub fn dropped_values(&self) -> Vec<&str> {
        self.dropped.iter().map(|c| c.value.as_str()).collect()
    }
}

/// Removes categories below a population-share threshold.
pub struct FrequencyFilter;

impl FrequencyFilter {
    /// Count and percentage for each non-null value of `column`.
    ///
    /// Sorted by count descending, then by value. Null cells are part of the
    /// denominator but have no entry.
    pub fn category_shares(df: &DataFrame, column: &str) -> Result<Vec<CategoryShare>> {
        let values = string_values(require_series(df, column)?)?;
        Ok(Self::shares_from_values(&values))
    }

    /// Keep rows whose category share is strictly greater than `threshold_pct`.
    ///
    /// # Errors
    ///
    /// - [`EquityError::InvalidConfig`] if the threshold is outside `[0, 100]`
    /// - [`EquityError::Schema`] if the column is absent
    pub fn filter(
        df: &DataFrame,
        column: &str,
        threshold_pct: f64,
    ) -> Result<(DataFrame, FrequencyFilterReport)> {
        if !(0.0..=100.0).contains(&threshold_pct) {
            return Err(EquityError::InvalidConfig(format!(
                "frequency threshold must be between 0 and 100, got {}",
                threshold_pct
            )));
        }

        let values = string_values(require_series(df, column)?)?;
        let shares = Self::shares_from_values(&values);

        let (retained, dropped): (Vec<CategoryShare>, Vec<CategoryShare>) = shares
            .into_iter()
            .partition(|share| share.percentage > threshold_pct);

        let keep: HashSet<&str> = retained.iter().map(|c| c.value.as_str()).collect();
        let mask_values: Vec<bool> = values
            .iter()
            .map(|v| v.as_deref().is_some_and(|v| keep.contains(v)))
            .collect();
        let null_rows = values.iter().filter(|v| v.is_none()).count();

        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
        let filtered = df.filter(&mask)?;

        info!(
            "Frequency filter on {} (>{}%): kept {} of {} rows",
            column,
            threshold_pct,
            filtered.height(),
            df.height()
        );
        if !dropped.is_empty() {
            warn!(
                "Dropped {} categories of {} at or below {}%: {:?}",
                dropped.len(),
                column,
                threshold_pct,
                dropped.iter().map(|c| c.value.as_str()).collect::<Vec<_>>()
            );
        }
        if null_rows > 0 {
            debug!("Dropped {} rows with null {}", null_rows, column);
        }

        let report = FrequencyFilterReport {
            column: column.to_string(),
            threshold_pct,
            rows_before: df.height(),
            rows_after: filtered.height(),
            retained,
            dropped,
            null_rows,
        };

        Ok((filtered, report))
    }

    fn shares_from_values(values: &[Option<String>]) -> Vec<CategoryShare> {
        let total = values.len();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values.iter().flatten() {
            *counts.entry(value.as_str()).or_insert(0) += 1;
        }

        let mut shares: Vec<CategoryShare> = counts
            .into_iter()
            .map(|(value, count)| CategoryShare {
                value: value.to_string(),
                count,
                percentage: percentage(count, total),
            })
            .collect();
        // BTreeMap order makes the value tie-break stable
        shares.sort_by(|a, b| b.count.cmp(&a.count));
        shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn race_table() -> DataFrame {
        // A: 60%, B: 20%, C: 20%
        df![
            "encounter_id" => [1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            "maternal_race" => ["A", "A", "A", "A", "A", "A", "B", "B", "C", "C"],
        ]
        .unwrap()
    }

    #[test]
    fn test_category_shares() {
        let shares = FrequencyFilter::category_shares(&race_table(), "maternal_race").unwrap();
        assert_eq!(
            shares,
            vec![
                CategoryShare { value: "A".to_string(), count: 6, percentage: 60.0 },
                CategoryShare { value: "B".to_string(), count: 2, percentage: 20.0 },
                CategoryShare { value: "C".to_string(), count: 2, percentage: 20.0 },
            ]
        );
    }

    #[test]
    fn test_filter_threshold_30_keeps_only_majority() {
        let (filtered, report) = FrequencyFilter::filter(&race_table(), "maternal_race", 30.0).unwrap();

        assert_eq!(filtered.height(), 6);
        assert_eq!(report.dropped_values(), vec!["B", "C"]);
        assert_eq!(report.retained.len(), 1);
        assert_eq!(report.rows_removed(), 4);
    }

    #[test]
    fn test_filter_share_equal_to_threshold_is_dropped() {
        let (filtered, report) = FrequencyFilter::filter(&race_table(), "maternal_race", 20.0).unwrap();
        assert_eq!(filtered.height(), 6);
        assert_eq!(report.dropped_values(), vec!["B", "C"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let (once, _) = FrequencyFilter::filter(&race_table(), "maternal_race", 25.0).unwrap();
        let (twice, report) = FrequencyFilter::filter(&once, "maternal_race", 25.0).unwrap();

        assert_eq!(once.height(), 6);
        assert_eq!(twice.height(), once.height());
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn test_filter_drops_null_categories() {
        let df = df![
            "maternal_race" => [Some("A"), Some("A"), None, Some("A")],
        ]
        .unwrap();

        let (filtered, report) = FrequencyFilter::filter(&df, "maternal_race", 0.0).unwrap();
        assert_eq!(filtered.height(), 3);
        assert_eq!(report.null_rows, 1);
        // Nulls still count towards the denominator
        assert_eq!(report.retained[0].percentage, 75.0);
    }

    #[test]
    fn test_filter_rejects_out_of_range_threshold() {
        let err = FrequencyFilter::filter(&race_table(), "maternal_race", 101.0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_filter_missing_column() {
        let err = FrequencyFilter::filter(&race_table(), "race", 3.0).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_filter_empty_table() {
        let df = df!["maternal_race" => Vec::<String>::new()].unwrap();
        let (filtered, report) = FrequencyFilter::filter(&df, "maternal_race", 3.0).unwrap();
        assert_eq!(filtered.height(), 0);
        assert!(report.retained.is_empty());
    }
}
