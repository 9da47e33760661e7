//! Temporal partitioning around a cutoff date.
//!
//! Dates are compared chronologically after parsing, never as raw strings:
//! `"3/1/2028"` and `"2028-03-01"` are the same day. Rows without a date, or
//! with a date that cannot be parsed, belong to neither side and are counted.

use crate::error::{EquityError, Result};
use crate::utils::{date_from_epoch_days, parse_date_str, require_series, string_values};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// The two sides of a partition plus what was left out.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Rows dated strictly before the cutoff.
    pub before: DataFrame,
    /// Rows dated on or after the cutoff.
    pub after: DataFrame,
    pub cutoff: NaiveDate,
    pub missing_dates: usize,
    pub unparseable_dates: usize,
}

impl Partition {
    pub fn summary(&self) -> PartitionSummary {
        PartitionSummary {
            cutoff: self.cutoff,
            before_rows: self.before.height(),
            after_rows: self.after.height(),
            missing_dates: self.missing_dates,
            unparseable_dates: self.unparseable_dates,
        }
    }

    /// Rows excluded from both sides.
    pub fn excluded_rows(&self) -> usize {
        self.missing_dates + self.unparseable_dates
    }
}

/// Serializable row counts of a [`Partition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub cutoff: NaiveDate,
    pub before_rows: usize,
    pub after_rows: usize,
    pub missing_dates: usize,
    pub unparseable_dates: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum DateCell {
    Valid(NaiveDate),
    Missing,
    Invalid(String),
}

/// Splits a table into before/after subsets.
pub struct TemporalPartitioner;

impl TemporalPartitioner {
    /// Parse a cutoff date string.
    pub fn parse_cutoff(cutoff: &str) -> Result<NaiveDate> {
        parse_date_str(cutoff).ok_or_else(|| {
            EquityError::InvalidConfig(format!("cannot parse cutoff date '{}'", cutoff))
        })
    }

    /// Split `df` on `column` around `cutoff`.
    ///
    /// With `strict` set, the first unparseable non-null date fails the call
    /// with [`EquityError::Data`]. Otherwise such rows are excluded and counted.
    ///
    /// # Errors
    ///
    /// Returns [`EquityError::Schema`] if the column is absent.
    pub fn split(df: &DataFrame, column: &str, cutoff: NaiveDate, strict: bool) -> Result<Partition> {
        let cells = Self::date_cells(require_series(df, column)?)?;

        if strict
            && let Some(DateCell::Invalid(value)) =
                cells.iter().find(|c| matches!(c, DateCell::Invalid(_)))
        {
            return Err(EquityError::Data {
                column: column.to_string(),
                value: value.clone(),
                reason: "not a recognized date".to_string(),
            });
        }

        let mut before_mask = Vec::with_capacity(cells.len());
        let mut after_mask = Vec::with_capacity(cells.len());
        let mut missing_dates = 0;
        let mut unparseable_dates = 0;

        for cell in &cells {
            match cell {
                DateCell::Valid(date) => {
                    before_mask.push(*date < cutoff);
                    after_mask.push(*date >= cutoff);
                }
                DateCell::Missing => {
                    missing_dates += 1;
                    before_mask.push(false);
                    after_mask.push(false);
                }
                DateCell::Invalid(value) => {
                    debug!("Unparseable date in {}: '{}'", column, value);
                    unparseable_dates += 1;
                    before_mask.push(false);
                    after_mask.push(false);
                }
            }
        }

        let before = df.filter(&BooleanChunked::from_slice("before".into(), &before_mask))?;
        let after = df.filter(&BooleanChunked::from_slice("after".into(), &after_mask))?;

        info!(
            "Partitioned on {} at {}: {} before, {} after",
            column,
            cutoff,
            before.height(),
            after.height()
        );
        if missing_dates + unparseable_dates > 0 {
            warn!(
                "Excluded {} rows without a usable {} ({} missing, {} unparseable)",
                missing_dates + unparseable_dates,
                column,
                missing_dates,
                unparseable_dates
            );
        }

        Ok(Partition {
            before,
            after,
            cutoff,
            missing_dates,
            unparseable_dates,
        })
    }

    fn date_cells(series: &Series) -> Result<Vec<DateCell>> {
        match series.dtype() {
            DataType::Date | DataType::Datetime(_, _) => {
                let as_date = series.cast(&DataType::Date)?;
                let days = as_date.cast(&DataType::Int32)?;
                Ok(days
                    .i32()?
                    .into_iter()
                    .map(|v| match v {
                        Some(d) => date_from_epoch_days(d)
                            .map(DateCell::Valid)
                            .unwrap_or_else(|| DateCell::Invalid(d.to_string())),
                        None => DateCell::Missing,
                    })
                    .collect())
            }
            _ => Ok(string_values(series)?
                .into_iter()
                .map(|v| match v {
                    None => DateCell::Missing,
                    Some(s) if s.trim().is_empty() => DateCell::Missing,
                    Some(s) => parse_date_str(&s)
                        .map(DateCell::Valid)
                        .unwrap_or(DateCell::Invalid(s)),
                })
                .collect()),
        }
    }
}
