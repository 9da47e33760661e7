//! Per-row derivation of the binary indicator columns.

use crate::error::Result;
use crate::utils::{indicator_flags, require_series, string_values};
use polars::prelude::*;

/// 1 where any of the given columns is non-null.
pub(crate) fn any_non_null(df: &DataFrame, columns: &[String]) -> Result<Vec<i32>> {
    let mut flags = vec![0i32; df.height()];
    for name in columns {
        let series = require_series(df, name)?;
        let present = series.is_not_null();
        for (flag, is_present) in flags.iter_mut().zip(present.into_iter()) {
            if is_present.unwrap_or(false) {
                *flag = 1;
            }
        }
    }
    Ok(flags)
}

/// 1 where any of the given columns holds a truthy value.
pub(crate) fn any_truthy(df: &DataFrame, columns: &[String]) -> Result<Vec<i32>> {
    let mut flags = vec![0i32; df.height()];
    for name in columns {
        let series = require_series(df, name)?;
        for (flag, truthy) in flags.iter_mut().zip(indicator_flags(series)?) {
            if truthy {
                *flag = 1;
            }
        }
    }
    Ok(flags)
}

/// 1 where the column is non-null and not blank.
pub(crate) fn non_blank(df: &DataFrame, column: &str) -> Result<Vec<i32>> {
    let series = require_series(df, column)?;
    Ok(string_values(series)?
        .into_iter()
        .map(|v| match v {
            Some(s) if !s.trim().is_empty() => 1,
            _ => 0,
        })
        .collect())
}
