//! Outlier detection.
//!
//! Flags numeric values outside `[Q1 - k*IQR, Q3 + k*IQR]` and reports the
//! identifiers of the affected records. Detection never mutates the table;
//! removal is a separate call so the caller decides what happens to flagged
//! records.

use crate::error::{EquityError, Result};
use crate::utils::{
    is_error_marker, is_numeric_dtype, parse_numeric_string, percentile_linear, require_series,
    string_values,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// A flagged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierRecord {
    /// Row position in the table that was inspected.
    pub row: usize,
    /// Identifier of the record; `None` when the id cell is null.
    pub id: Option<String>,
    pub value: f64,
}

/// Quartiles and the bounds derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Compute bounds from sorted values, or `None` if there are none.
    pub fn from_sorted(sorted: &[f64], multiplier: f64) -> Option<Self> {
        let q1 = percentile_linear(sorted, 25.0)?;
        let q3 = percentile_linear(sorted, 75.0)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            iqr,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        })
    }

    /// Whether a value lies strictly outside the bounds.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Result of an IQR outlier scan over one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub column: String,
    pub multiplier: f64,
    /// `None` when the column has no valid numeric values.
    pub bounds: Option<IqrBounds>,
    pub outliers: Vec<OutlierRecord>,
    /// Null cells and missing-value markers.
    pub missing_count: usize,
    /// Non-null cells that could not be read as numbers.
    pub unparseable_count: usize,
}

impl OutlierReport {
    /// Identifiers of the flagged records (null ids omitted).
    pub fn ids(&self) -> Vec<String> {
        self.outliers.iter().filter_map(|o| o.id.clone()).collect()
    }

    /// Offending values, in row order.
    pub fn values(&self) -> Vec<f64> {
        self.outliers.iter().map(|o| o.value).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.outliers.is_empty()
    }
}

/// Cell of a numeric column after parsing.
enum NumericCell {
    Value(f64),
    Missing,
    Unparseable,
}

/// Detects outliers with the interquartile-range method.
pub struct OutlierDetector;

impl OutlierDetector {
    /// Flag values of `column` outside the IQR bounds scaled by `multiplier`.
    ///
    /// String columns are parsed leniently (`"$1,200"`, `" 31 "`); cells that
    /// still fail to parse are skipped and counted in the report.
    ///
    /// # Errors
    ///
    /// - [`EquityError::InvalidConfig`] if `multiplier` is not a positive number
    /// - [`EquityError::Schema`] if `column` or `id_column` is absent
    pub fn detect_iqr(
        df: &DataFrame,
        column: &str,
        id_column: &str,
        multiplier: f64,
    ) -> Result<OutlierReport> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(EquityError::InvalidConfig(format!(
                "outlier multiplier must be positive, got {}",
                multiplier
            )));
        }

        let series = require_series(df, column)?;
        let ids = string_values(require_series(df, id_column)?)?;
        let cells = Self::numeric_cells(series)?;

        let missing_count = cells
            .iter()
            .filter(|c| matches!(c, NumericCell::Missing))
            .count();
        let unparseable_count = cells
            .iter()
            .filter(|c| matches!(c, NumericCell::Unparseable))
            .count();

        let mut sorted: Vec<f64> = cells
            .iter()
            .filter_map(|c| match c {
                NumericCell::Value(v) => Some(*v),
                _ => None,
            })
            .collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let bounds = IqrBounds::from_sorted(&sorted, multiplier);
        let outliers = match &bounds {
            Some(b) => cells
                .iter()
                .enumerate()
                .filter_map(|(row, cell)| match cell {
                    NumericCell::Value(v) if b.is_outlier(*v) => Some(OutlierRecord {
                        row,
                        id: ids.get(row).cloned().flatten(),
                        value: *v,
                    }),
                    _ => None,
                })
                .collect(),
            None => Vec::new(),
        };

        if let Some(b) = &bounds {
            info!(
                "Outliers detected in the column {} using IQR method with multiplier {}: {}",
                column,
                multiplier,
                outliers.len()
            );
            debug!(
                "Q1={:.3} Q3={:.3} IQR={:.3} bounds=[{:.3}, {:.3}]",
                b.q1, b.q3, b.iqr, b.lower, b.upper
            );
            for outlier in &outliers {
                debug!(
                    "Outlier: {}, {}: {}",
                    outlier.value,
                    id_column,
                    outlier.id.as_deref().unwrap_or("<null>")
                );
            }
        } else {
            info!("No numeric values in column {}; outlier detection skipped", column);
        }

        Ok(OutlierReport {
            column: column.to_string(),
            multiplier,
            bounds,
            outliers,
            missing_count,
            unparseable_count,
        })
    }

    /// Remove every row whose identifier is in `ids`.
    ///
    /// Identifiers are compared in their string form. Rows with a null id are
    /// never removed.
    pub fn remove_rows_by_ids(df: &DataFrame, id_column: &str, ids: &[String]) -> Result<DataFrame> {
        let id_values = string_values(require_series(df, id_column)?)?;
        let to_remove: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();

        let mask_values: Vec<bool> = id_values
            .iter()
            .map(|id| match id {
                Some(id) => !to_remove.contains(id.as_str()),
                None => true,
            })
            .collect();

        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
        let cleaned = df.filter(&mask)?;

        debug!("Table shape before removing rows: {:?}", df.shape());
        debug!("Table shape after removing rows: {:?}", cleaned.shape());

        Ok(cleaned)
    }

    fn numeric_cells(series: &Series) -> Result<Vec<NumericCell>> {
        if is_numeric_dtype(series.dtype()) {
            let as_float = series.cast(&DataType::Float64)?;
            return Ok(as_float
                .f64()?
                .into_iter()
                .map(|v| match v {
                    Some(x) if x.is_nan() => NumericCell::Missing,
                    Some(x) => NumericCell::Value(x),
                    None => NumericCell::Missing,
                })
                .collect());
        }

        Ok(string_values(series)?
            .into_iter()
            .map(|v| match v {
                None => NumericCell::Missing,
                Some(s) if s.trim().is_empty() || is_error_marker(&s) => NumericCell::Missing,
                Some(s) => match parse_numeric_string(&s) {
                    Some(x) if x.is_finite() => NumericCell::Value(x),
                    _ => NumericCell::Unparseable,
                },
            })
            .collect())
    }
}
