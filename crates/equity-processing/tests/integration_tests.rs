//! Integration tests for the equity pipeline.
//!
//! These tests load the CSV fixtures through the record source and run the
//! whole pipeline on them.

use equity_processing::{
    ColumnRoles, EquityConfig, EquityError, EquityPipeline, FairnessEngine, FrequencyFilter,
    PipelineStage, Rate, ReferenceGroups, TemporalPartitioner, TimeWindow, source,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(filename: &str) -> DataFrame {
    source::load_table(fixtures_path().join(filename)).expect("Failed to load fixture")
}

fn delivery_roles() -> ColumnRoles {
    ColumnRoles {
        partition_date_column: "delivery_date".to_string(),
        ..ColumnRoles::default()
    }
}

fn config_with(roles: ColumnRoles, groups: (&str, &str)) -> EquityConfig {
    EquityConfig::builder()
        .columns(roles)
        .parity_reference_groups(ReferenceGroups::new(groups.0, groups.1))
        .build()
        .unwrap()
}

fn run(config: EquityConfig, df: DataFrame) -> equity_processing::PipelineOutput {
    EquityPipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run(df)
        .expect("Pipeline should succeed")
}

fn ids(df: &DataFrame) -> HashSet<i64> {
    df.column("encounter_id")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn approx(rate: Rate, expected: f64) -> bool {
    rate.value().is_some_and(|v| (v - expected).abs() < 1e-9)
}

// ============================================================================
// Full Pipeline
// ============================================================================

#[test]
fn test_full_pipeline_on_encounters() {
    let output = run(config_with(delivery_roles(), ("Black", "White")), load("encounters.csv"));
    let report = &output.report;

    assert_eq!(report.normalization.reported_count, 7);
    assert_eq!(report.normalization.positive_count, 10);
    assert_eq!(report.normalization.ordered_count, 17);
    assert_eq!(
        report.normalization.detected_columns,
        vec!["amphetamine_detected".to_string(), "opiate_detected".to_string()]
    );

    let outliers = report.outliers.as_ref().unwrap();
    assert_eq!(outliers.ids(), vec!["1040".to_string()]);
    let bounds = outliers.bounds.as_ref().unwrap();
    assert_eq!((bounds.q1, bounds.q3), (27.0, 32.0));

    assert_eq!(report.frequency.dropped_values(), vec!["Pacific Islander"]);
    assert_eq!(report.summary.rows_before, 41);
    assert_eq!(report.summary.rows_after, 38);
    assert_eq!(output.table.height(), 38);

    assert_eq!(report.partition.before_rows, 18);
    assert_eq!(report.partition.after_rows, 19);
    assert_eq!(report.partition.unparseable_dates, 1);
    assert_eq!(report.partition.missing_dates, 0);
}

#[test]
fn test_full_window_group_metrics() {
    let output = run(config_with(delivery_roles(), ("Black", "White")), load("encounters.csv"));
    let all = output.report.window(TimeWindow::All).unwrap();

    assert_eq!(all.metrics.groups(), vec!["White", "Black", "Hispanic"]);

    let white = all.metrics.group("White").unwrap();
    assert_eq!((white.total, white.ordered, white.positive), (16, 4, 2));
    assert_eq!(white.ordered_pct_of_total, 25.0);
    assert_eq!(white.positive_pct_of_ordered, Rate::Defined(50.0));
    assert_eq!(
        (
            white.true_positives,
            white.false_positives,
            white.false_negatives,
            white.true_negatives
        ),
        (2, 2, 1, 11)
    );

    let black = all.metrics.group("Black").unwrap();
    assert_eq!((black.total, black.ordered), (12, 6));
    assert_eq!(black.ordered_pct_of_total, 50.0);

    let hispanic = all.metrics.group("Hispanic").unwrap();
    assert_eq!(hispanic.ordered_pct_of_total, 40.0);

    for row in &all.metrics.rows {
        assert_eq!(
            row.true_positives + row.true_negatives + row.false_positives + row.false_negatives,
            row.total
        );
    }
}

#[test]
fn test_parity_across_cutoff() {
    let output = run(config_with(delivery_roles(), ("Black", "White")), load("encounters.csv"));
    let report = &output.report;

    let all = report.window(TimeWindow::All).unwrap().parity.as_ref().unwrap();
    assert_eq!(all.ratio, Rate::Defined(2.0));

    // Before: 66.67% vs 28.57%, after: 40% vs 22.22%
    let before = report.window(TimeWindow::Before).unwrap().parity.as_ref().unwrap();
    let after = report.window(TimeWindow::After).unwrap().parity.as_ref().unwrap();
    assert!(approx(before.ratio, 7.0 / 3.0));
    assert!(approx(after.ratio, 1.8));
    assert!(approx(report.parity_delta_pct, 100.0 * (7.0 / 3.0 - 1.8) / (7.0 / 3.0)));
}

#[test]
fn test_default_partition_column_excludes_untested_records() {
    let output = run(
        config_with(ColumnRoles::default(), ("Hispanic", "White")),
        load("encounters.csv"),
    );
    let report = &output.report;

    assert_eq!(report.partition.missing_dates, 24);
    assert_eq!(report.partition.before_rows, 8);
    assert_eq!(report.partition.after_rows, 6);
    assert!(report.summary.warnings.iter().any(|w| w.contains("24 rows")));

    // Every partitioned record was ordered, so parity is flat
    let before = report.window(TimeWindow::Before).unwrap().parity.as_ref().unwrap();
    assert_eq!(before.ratio, Rate::Defined(1.0));
    assert_eq!(report.parity_delta_pct, Rate::Defined(0.0));
}

#[test]
fn test_strict_dates_fail_on_unparseable_value() {
    let config = EquityConfig::builder()
        .columns(delivery_roles())
        .strict_dates(true)
        .build()
        .unwrap();

    let err = EquityPipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .run(load("encounters.csv"))
        .unwrap_err();

    assert_eq!(err.error_code(), "DATA_ERROR");
    assert_eq!(err.column(), Some("delivery_date"));
}

#[test]
fn test_missing_reference_group_is_fatal() {
    let err = EquityPipeline::builder()
        .config(config_with(delivery_roles(), ("Pacific Islander", "White")))
        .build()
        .unwrap()
        .run(load("encounters.csv"))
        .unwrap_err();

    // Dropped by the frequency filter, so absent from the full window
    assert!(matches!(err, EquityError::EmptyGroup(ref g) if g == "Pacific Islander"));
}

// ============================================================================
// Tab-Separated Input
// ============================================================================

#[test]
fn test_tab_separated_input_with_undefined_parity() {
    let roles = ColumnRoles {
        numeric_column: None,
        partition_date_column: "delivery_date".to_string(),
        ..ColumnRoles::default()
    };
    let output = run(config_with(roles, ("A", "B")), load("encounters_small.txt"));
    let report = &output.report;

    assert_eq!(report.window(TimeWindow::All).unwrap().parity.as_ref().unwrap().ratio, Rate::Defined(1.0));

    // B has no ordered records before the cutoff
    let before = report.window(TimeWindow::Before).unwrap().parity.as_ref().unwrap();
    assert_eq!(before.ratio, Rate::Undefined);
    let after = report.window(TimeWindow::After).unwrap().parity.as_ref().unwrap();
    assert_eq!(after.ratio, Rate::Defined(0.0));
    assert_eq!(report.parity_delta_pct, Rate::Undefined);

    let json: serde_json::Value = serde_json::to_value(report).unwrap();
    assert!(json["parity_delta_pct"].is_null());
    assert!(json["windows"][1]["parity"]["ratio"].is_null());
    assert_eq!(json["windows"][2]["parity"]["ratio"], serde_json::json!(0.0));
}

// ============================================================================
// Component Properties on Fixture Data
// ============================================================================

#[test]
fn test_partition_is_disjoint_cover() {
    let df = load("encounters.csv");
    let cutoff = TemporalPartitioner::parse_cutoff("2028-03-01").unwrap();
    let partition = TemporalPartitioner::split(&df, "delivery_date", cutoff, false).unwrap();

    let before = ids(&partition.before);
    let after = ids(&partition.after);
    assert!(before.is_disjoint(&after));
    assert_eq!(before.len() + after.len() + partition.excluded_rows(), df.height());
    // Only the "TBD" row is left out
    assert!(!before.contains(&1034) && !after.contains(&1034));
}

#[test]
fn test_frequency_filter_idempotent_on_fixture() {
    let df = load("encounters.csv");
    let (once, first) = FrequencyFilter::filter(&df, "maternal_race", 3.0).unwrap();
    let (twice, second) = FrequencyFilter::filter(&once, "maternal_race", 3.0).unwrap();

    assert!(!first.dropped.is_empty());
    assert!(second.dropped.is_empty());
    assert_eq!(once.height(), twice.height());
}

#[test]
fn test_metrics_table_renders_to_dataframe() {
    let output = run(config_with(delivery_roles(), ("Black", "White")), load("encounters.csv"));
    let table = FairnessEngine::compute(&output.after, "maternal_race", "test_positive", "test_ordered")
        .unwrap();
    let df = table.to_dataframe().unwrap();

    assert_eq!(df.height(), 3);
    let totals: Vec<u64> = df.column("total").unwrap().u64().unwrap().into_no_null_iter().collect();
    assert_eq!(totals.iter().sum::<u64>(), output.after.height() as u64);
}

// ============================================================================
// Progress Reporting
// ============================================================================

#[test]
fn test_progress_reaches_complete() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let updates_clone = updates.clone();

    EquityPipeline::builder()
        .config(config_with(delivery_roles(), ("Black", "White")))
        .on_progress(move |update| {
            updates_clone.lock().unwrap().push(update);
        })
        .build()
        .unwrap()
        .run(load("encounters.csv"))
        .unwrap();

    let updates = updates.lock().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.stage, PipelineStage::Complete);
    assert_eq!(last.progress, 1.0);

    // Overall progress never goes backwards
    for pair in updates.windows(2) {
        assert!(pair[1].progress >= pair[0].progress);
    }
}
