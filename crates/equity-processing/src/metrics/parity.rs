//! Demographic parity between two reference groups.

use super::engine::FairnessTable;
use crate::error::{EquityError, Result};
use crate::types::Rate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered-rate ratio of `group_a` to `group_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityRatio {
    pub group_a: String,
    pub group_b: String,
    /// `Undefined` when `group_b` has no ordered rows.
    pub ratio: Rate,
}

/// `ordered_pct(group_a) / ordered_pct(group_b)`.
///
/// # Errors
///
/// Returns [`EquityError::EmptyGroup`] if either group is absent from `table`.
pub fn demographic_parity_ratio(
    table: &FairnessTable,
    group_a: &str,
    group_b: &str,
) -> Result<ParityRatio> {
    let a = table
        .group(group_a)
        .ok_or_else(|| EquityError::EmptyGroup(group_a.to_string()))?;
    let b = table
        .group(group_b)
        .ok_or_else(|| EquityError::EmptyGroup(group_b.to_string()))?;

    let ratio = Rate::ratio(a.ordered_pct_of_total, b.ordered_pct_of_total);
    debug!("Parity {}/{} = {:?}", group_a, group_b, ratio);

    Ok(ParityRatio {
        group_a: group_a.to_string(),
        group_b: group_b.to_string(),
        ratio,
    })
}

/// Relative change of the parity ratio, `100 * (before - after) / before`.
pub fn parity_delta(before: &ParityRatio, after: &ParityRatio) -> Rate {
    match (before.ratio, after.ratio) {
        (Rate::Defined(b), Rate::Defined(a)) => Rate::ratio(100.0 * (b - a), b),
        _ => Rate::Undefined,
    }
}
