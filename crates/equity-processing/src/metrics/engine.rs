//! Per-group fairness metrics.

use crate::error::Result;
use crate::types::Rate;
use crate::utils::{indicator_flags, percentage, require_series, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Metrics of one sensitive-attribute group.
///
/// `ordered_pct_of_total` is relative to the whole group, while
/// `positive_pct_of_ordered` only looks at rows where the predicted indicator
/// is set. The confusion counts always cover the whole group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub group: String,
    pub total: usize,
    pub ordered: usize,
    pub ordered_pct_of_total: f64,
    pub positive: usize,
    pub positive_pct_of_ordered: Rate,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub tpr: Rate,
    pub tnr: Rate,
    pub fpr: Rate,
    /// Predicted-positive proportion, `(tp + fp) / total`.
    pub ppp: Rate,
}

#[derive(Debug, Default)]
struct GroupCounts {
    total: usize,
    tp: usize,
    tn: usize,
    fp: usize,
    fn_: usize,
}

impl GroupCounts {
    fn add(&mut self, truth: bool, predicted: bool) {
        self.total += 1;
        match (truth, predicted) {
            (true, true) => self.tp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fp += 1,
            (true, false) => self.fn_ += 1,
        }
    }

    fn into_metrics(self, group: String) -> GroupMetrics {
        // positive counts truth among ordered rows, which is exactly tp
        let ordered = self.tp + self.fp;
        let positive = self.tp;
        GroupMetrics {
            group,
            total: self.total,
            ordered,
            ordered_pct_of_total: percentage(ordered, self.total),
            positive,
            positive_pct_of_ordered: Rate::percentage(positive, ordered),
            true_positives: self.tp,
            true_negatives: self.tn,
            false_positives: self.fp,
            false_negatives: self.fn_,
            tpr: Rate::from_counts(self.tp, self.tp + self.fn_),
            tnr: Rate::from_counts(self.tn, self.tn + self.fp),
            fpr: Rate::from_counts(self.fp, self.fp + self.tn),
            ppp: Rate::from_counts(ordered, self.total),
        }
    }
}

/// Metrics for every group of a sensitive column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessTable {
    pub sensitive_column: String,
    pub truth_column: String,
    pub predicted_column: String,
    /// Sorted by `total` descending, then by group name.
    pub rows: Vec<GroupMetrics>,
    /// Rows skipped because the sensitive value is null.
    pub unassigned_rows: usize,
}

impl FairnessTable {
    pub fn group(&self, name: &str) -> Option<&GroupMetrics> {
        self.rows.iter().find(|r| r.group == name)
    }

    pub fn groups(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.group.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a table for the presentation layer. Undefined rates become nulls.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let groups: Vec<&str> = self.groups();
        let ordered_pct: Vec<f64> = self.rows.iter().map(|r| r.ordered_pct_of_total).collect();

        let df = DataFrame::new(vec![
            Series::new(self.sensitive_column.as_str().into(), groups).into(),
            Series::new("total".into(), self.count_column(|r| r.total)).into(),
            Series::new("ordered".into(), self.count_column(|r| r.ordered)).into(),
            Series::new("ordered_pct_of_total".into(), ordered_pct).into(),
            Series::new("positive".into(), self.count_column(|r| r.positive)).into(),
            Series::new(
                "positive_pct_of_ordered".into(),
                self.rate_column(|r| r.positive_pct_of_ordered),
            )
            .into(),
            Series::new("true_positives".into(), self.count_column(|r| r.true_positives)).into(),
            Series::new("true_negatives".into(), self.count_column(|r| r.true_negatives)).into(),
            Series::new("false_positives".into(), self.count_column(|r| r.false_positives)).into(),
            Series::new("false_negatives".into(), self.count_column(|r| r.false_negatives)).into(),
            Series::new("tpr".into(), self.rate_column(|r| r.tpr)).into(),
            Series::new("tnr".into(), self.rate_column(|r| r.tnr)).into(),
            Series::new("fpr".into(), self.rate_column(|r| r.fpr)).into(),
            Series::new("ppp".into(), self.rate_column(|r| r.ppp)).into(),
        ])?;
        Ok(df)
    }

    fn count_column(&self, f: fn(&GroupMetrics) -> usize) -> Vec<u64> {
        self.rows.iter().map(|r| f(r) as u64).collect()
    }

    fn rate_column(&self, f: fn(&GroupMetrics) -> Rate) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| f(r).value()).collect()
    }
}

/// Computes [`FairnessTable`]s.
pub struct FairnessEngine;

impl FairnessEngine {
    /// Aggregate per distinct non-null value of `sensitive`.
    ///
    /// `truth` and `predicted` are read as indicator columns: nulls are 0
    /// and strings follow the same truthiness rules as the normalizer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EquityError::Schema`] if any of the three columns is absent.
    pub fn compute(
        df: &DataFrame,
        sensitive: &str,
        truth: &str,
        predicted: &str,
    ) -> Result<FairnessTable> {
        let groups = string_values(require_series(df, sensitive)?)?;
        let truth_flags = indicator_flags(require_series(df, truth)?)?;
        let predicted_flags = indicator_flags(require_series(df, predicted)?)?;

        let mut counts: BTreeMap<String, GroupCounts> = BTreeMap::new();
        let mut unassigned_rows = 0;

        for ((group, truth), predicted) in groups
            .into_iter()
            .zip(truth_flags)
            .zip(predicted_flags)
        {
            match group {
                Some(group) => counts.entry(group).or_default().add(truth, predicted),
                None => unassigned_rows += 1,
            }
        }

        if unassigned_rows > 0 {
            warn!(
                "{} rows have no {} value and are left out of the metrics",
                unassigned_rows, sensitive
            );
        }

        let mut rows: Vec<GroupMetrics> = counts
            .into_iter()
            .map(|(group, c)| c.into_metrics(group))
            .collect();
        // Stable sort keeps the BTreeMap name order for equal totals
        rows.sort_by(|a, b| b.total.cmp(&a.total));

        debug!("Computed metrics for {} groups of {}", rows.len(), sensitive);

        Ok(FairnessTable {
            sensitive_column: sensitive.to_string(),
            truth_column: truth.to_string(),
            predicted_column: predicted.to_string(),
            rows,
            unassigned_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ========================================================================
    // Fixtures
    // ========================================================================

    fn two_group_table() -> DataFrame {
        df![
            "maternal_race" => ["A", "A", "A", "A", "A", "B", "B", "B", "B", "B"],
            "test_ordered" => [1i32, 1, 0, 0, 1, 1, 0, 0, 0, 0],
            "test_positive" => [1i32, 0, 0, 0, 1, 1, 0, 0, 0, 0],
        ]
        .unwrap()
    }

    fn compute(df: &DataFrame) -> FairnessTable {
        FairnessEngine::compute(df, "maternal_race", "test_positive", "test_ordered").unwrap()
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    #[test]
    fn test_two_group_scenario() {
        let table = compute(&two_group_table());

        let a = table.group("A").unwrap();
        assert_eq!(a.total, 5);
        assert_eq!(a.ordered, 3);
        assert_eq!(a.ordered_pct_of_total, 60.0);
        assert_eq!(a.positive, 2);
        let pct = a.positive_pct_of_ordered.value().unwrap();
        assert!((pct - 66.666_666).abs() < 0.001);
        assert_eq!(
            (a.true_positives, a.false_positives, a.false_negatives, a.true_negatives),
            (2, 1, 0, 2)
        );

        let b = table.group("B").unwrap();
        assert_eq!(b.total, 5);
        assert_eq!(b.ordered, 1);
        assert_eq!(b.ordered_pct_of_total, 20.0);
        assert_eq!(b.positive, 1);
        assert_eq!(b.positive_pct_of_ordered, Rate::Defined(100.0));
    }

    #[test]
    fn test_confusion_counts_sum_to_total() {
        let table = compute(&two_group_table());
        for row in &table.rows {
            assert_eq!(
                row.true_positives + row.true_negatives + row.false_positives + row.false_negatives,
                row.total
            );
            assert!((0.0..=100.0).contains(&row.ordered_pct_of_total));
            if let Some(pct) = row.positive_pct_of_ordered.value() {
                assert!((0.0..=100.0).contains(&pct));
            }
        }
    }

    #[test]
    fn test_rates() {
        let table = compute(&two_group_table());
        let a = table.group("A").unwrap();
        assert_eq!(a.tpr, Rate::Defined(1.0));
        assert_eq!(a.tnr, Rate::Defined(2.0 / 3.0));
        assert_eq!(a.fpr, Rate::Defined(1.0 / 3.0));
        assert_eq!(a.ppp, Rate::Defined(3.0 / 5.0));
    }

    #[test]
    fn test_zero_ordered_gives_undefined_positive_pct() {
        let df = df![
            "maternal_race" => ["C", "C"],
            "test_ordered" => [0i32, 0],
            "test_positive" => [0i32, 0],
        ]
        .unwrap();

        let c = compute(&df).group("C").cloned().unwrap();
        assert_eq!(c.ordered_pct_of_total, 0.0);
        assert_eq!(c.positive_pct_of_ordered, Rate::Undefined);
        assert_eq!(c.tpr, Rate::Undefined);
        assert_eq!(c.tnr, Rate::Defined(1.0));
    }

    #[test]
    fn test_rows_sorted_by_total_then_name() {
        let df = df![
            "maternal_race" => ["Z", "Y", "Y", "X", "X"],
            "test_ordered" => [0i32, 0, 0, 0, 0],
            "test_positive" => [0i32, 0, 0, 0, 0],
        ]
        .unwrap();
        assert_eq!(compute(&df).groups(), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_null_groups_are_unassigned() {
        let df = df![
            "maternal_race" => [Some("A"), None, Some("A")],
            "test_ordered" => [Some(1i32), Some(1), None],
            "test_positive" => [Some(1i32), Some(0), Some(1)],
        ]
        .unwrap();

        let table = compute(&df);
        assert_eq!(table.unassigned_rows, 1);
        assert_eq!(table.groups(), vec!["A"]);
        // Null predicted reads as 0
        let a = table.group("A").unwrap();
        assert_eq!(a.ordered, 1);
        assert_eq!(a.false_negatives, 1);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let err = FairnessEngine::compute(&two_group_table(), "maternal_race", "uds_positive", "test_ordered")
            .unwrap_err();
        assert_eq!(err.column(), Some("uds_positive"));
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    #[test]
    fn test_to_dataframe_renders_undefined_as_null() {
        let df = df![
            "maternal_race" => ["A", "A", "B"],
            "test_ordered" => [1i32, 0, 0],
            "test_positive" => [1i32, 0, 0],
        ]
        .unwrap();

        let out = compute(&df).to_dataframe().unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.width(), 14);

        let pct = out.column("positive_pct_of_ordered").unwrap().f64().unwrap();
        assert_eq!(pct.get(0), Some(100.0));
        assert_eq!(pct.get(1), None);
    }
}
