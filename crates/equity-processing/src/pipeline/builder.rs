//! The equity pipeline and its builder.

use crate::config::{ConfigValidationError, EquityConfig, ReferenceGroups};
use crate::error::{EquityError, Result, ResultExt};
use crate::filter::FrequencyFilter;
use crate::metrics::{
    FairnessEngine, FairnessTable, ParityRatio, demographic_parity_ratio, parity_delta,
};
use crate::normalizer::RecordNormalizer;
use crate::outliers::{OutlierDetector, OutlierReport};
use crate::partition::TemporalPartitioner;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{
    ActionType, EquityReport, PipelineAction, PipelineOutput, Rate, RunSummary, TimeWindow,
    WindowMetrics,
};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Share of removed rows above which the run summary carries a warning.
const ROWS_REMOVED_WARNING_PCT: f32 = 30.0;

/// Runs normalization, outlier removal, frequency filtering, partitioning
/// and fairness metrics over one table.
///
/// # Example
///
/// ```rust,ignore
/// use equity_processing::{EquityConfig, EquityPipeline, ReferenceGroups};
///
/// let config = EquityConfig::builder()
///     .parity_reference_groups(ReferenceGroups::new("Black", "White"))
///     .build()?;
///
/// let output = EquityPipeline::builder()
///     .config(config)
///     .build()?
///     .run(df)?;
///
/// println!("{}", serde_json::to_string_pretty(&output.report)?);
/// ```
pub struct EquityPipeline {
    config: EquityConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(EquityPipeline: Send);

impl EquityPipeline {
    pub fn builder() -> EquityPipelineBuilder {
        EquityPipelineBuilder::default()
    }

    pub fn config(&self) -> &EquityConfig {
        &self.config
    }

    /// Run every stage on `df`.
    ///
    /// Reports [`PipelineStage::Complete`] or [`PipelineStage::Failed`] to the
    /// progress reporter before returning.
    pub fn run(&self, df: DataFrame) -> Result<PipelineOutput> {
        match self.run_internal(df) {
            Ok(output) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(output)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, df: DataFrame) -> Result<PipelineOutput> {
        let start_time = Instant::now();
        let config = &self.config;
        let columns = &config.columns;

        info!("Starting equity pipeline on {} rows...", df.height());
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting equity pipeline...",
        ));

        let cutoff = config.cutoff_date()?;
        let mut summary = RunSummary::new();
        summary.rows_before = df.height();

        // Step 1: Derive indicators
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Normalizing,
            0.0,
            "Deriving indicator columns...",
        ));
        let (table, normalization) = RecordNormalizer::normalize(&df, columns)?;
        drop(df);

        summary.add_action(
            PipelineAction::new(
                ActionType::IndicatorsDerived,
                "dataset",
                format!(
                    "{} reported, {} positive, {} ordered",
                    normalization.reported_count,
                    normalization.positive_count,
                    normalization.ordered_count
                ),
            )
            .with_details(format!(
                "Detection columns: {}",
                normalization.detected_columns.join(", ")
            )),
        );
        if !normalization.missing_output_columns.is_empty() {
            summary.add_warning(format!(
                "Output columns not found: {}",
                normalization.missing_output_columns.join(", ")
            ));
        }
        if normalization.collection_column_missing {
            summary.add_warning(format!(
                "Collection column '{}' not found; no record counts as ordered",
                columns.collection_date_column
            ));
        }
        if normalization.detected_columns.is_empty() {
            summary.add_warning(format!(
                "No columns containing '{}'; no record counts as positive",
                columns.detected_marker
            ));
        }

        // Step 2: Outliers
        self.report_progress(ProgressUpdate::new(
            PipelineStage::OutlierDetection,
            0.0,
            "Detecting outliers...",
        ));
        let (table, outliers) = match &columns.numeric_column {
            Some(numeric) => {
                let (table, report) = self.handle_outliers(table, numeric, &mut summary)?;
                (table, Some(report))
            }
            None => {
                debug!("No numeric column configured, skipping outlier detection");
                (table, None)
            }
        };

        // Step 3: Rare categories
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FrequencyFiltering,
            0.0,
            "Filtering rare categories...",
        ));
        let (table, frequency) = FrequencyFilter::filter(
            &table,
            &columns.sensitive_column,
            config.frequency_threshold_pct,
        )?;
        if !frequency.dropped.is_empty() {
            summary.add_action(
                PipelineAction::new(
                    ActionType::CategoriesDropped,
                    &columns.sensitive_column,
                    format!(
                        "Dropped {} categories at or below {}%",
                        frequency.dropped.len(),
                        config.frequency_threshold_pct
                    ),
                )
                .with_details(frequency.dropped_values().join(", ")),
            );
        }
        if frequency.null_rows > 0 {
            summary.add_action(PipelineAction::new(
                ActionType::RowsExcluded,
                &columns.sensitive_column,
                format!("Excluded {} rows with no value", frequency.null_rows),
            ));
        }

        summary.rows_after = table.height();
        summary.rows_removed = summary.rows_before.saturating_sub(summary.rows_after);

        // Step 4: Partition
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Partitioning,
            0.0,
            format!("Partitioning at {}...", cutoff),
        ));
        let partition = TemporalPartitioner::split(
            &table,
            &columns.partition_date_column,
            cutoff,
            config.strict_dates,
        )
        .context("Partitioning failed")?;
        summary.add_action(PipelineAction::new(
            ActionType::TablePartitioned,
            &columns.partition_date_column,
            format!(
                "{} rows before and {} rows from {}",
                partition.before.height(),
                partition.after.height(),
                cutoff
            ),
        ));
        if partition.excluded_rows() > 0 {
            summary.add_action(PipelineAction::new(
                ActionType::RowsExcluded,
                &columns.partition_date_column,
                format!(
                    "Excluded {} rows from both windows ({} missing, {} unparseable dates)",
                    partition.excluded_rows(),
                    partition.missing_dates,
                    partition.unparseable_dates
                ),
            ));
            summary.add_warning(format!(
                "{} rows have no usable {} and are only counted in the full window",
                partition.excluded_rows(),
                columns.partition_date_column
            ));
        }

        // Step 5: Metrics per window
        let windows = [
            (TimeWindow::All, &table),
            (TimeWindow::Before, &partition.before),
            (TimeWindow::After, &partition.after),
        ];
        let mut window_metrics = Vec::with_capacity(windows.len());
        for (i, (window, frame)) in windows.into_iter().enumerate() {
            self.report_progress(ProgressUpdate::with_sub_stage(
                PipelineStage::MetricsComputation,
                format!("Window: {}", window.display_name()),
                i as f32 / 3.0,
                format!("Computing metrics for {}...", window.display_name()),
            ));
            window_metrics.push(self.compute_window(window, frame, &mut summary)?);
        }

        let parity_delta_pct = match (&window_metrics[1].parity, &window_metrics[2].parity) {
            (Some(before), Some(after)) => parity_delta(before, after),
            _ => Rate::Undefined,
        };
        if config.parity_reference_groups.is_some() && !parity_delta_pct.is_defined() {
            summary.add_warning("Parity delta is undefined");
        }

        if summary.rows_removed_percentage() > ROWS_REMOVED_WARNING_PCT {
            summary.add_warning(format!(
                "{:.1}% of rows were removed before partitioning",
                summary.rows_removed_percentage()
            ));
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Equity pipeline finished in {}ms: {} -> {} rows",
            summary.duration_ms, summary.rows_before, summary.rows_after
        );

        let report = EquityReport {
            normalization,
            outliers,
            frequency,
            partition: partition.summary(),
            windows: window_metrics,
            parity_delta_pct,
            summary,
        };

        Ok(PipelineOutput {
            table,
            before: partition.before,
            after: partition.after,
            report,
        })
    }

    fn handle_outliers(
        &self,
        table: DataFrame,
        numeric: &str,
        summary: &mut RunSummary,
    ) -> Result<(DataFrame, OutlierReport)> {
        let id_column = &self.config.columns.id_column;
        let report =
            OutlierDetector::detect_iqr(&table, numeric, id_column, self.config.outlier_multiplier)?;

        if report.unparseable_count > 0 {
            summary.add_warning(format!(
                "{} values of {} could not be parsed and were skipped",
                report.unparseable_count, numeric
            ));
        }
        if report.is_empty() {
            return Ok((table, report));
        }

        let ids = report.ids();
        summary.add_action(
            PipelineAction::new(
                ActionType::OutliersDetected,
                numeric,
                format!("Flagged {} values outside the IQR bounds", report.outliers.len()),
            )
            .with_details(ids.join(", ")),
        );

        if !self.config.remove_outliers {
            return Ok((table, report));
        }

        let cleaned = OutlierDetector::remove_rows_by_ids(&table, id_column, &ids)?;
        summary.add_action(PipelineAction::new(
            ActionType::OutliersRemoved,
            numeric,
            format!("Removed {} rows", table.height() - cleaned.height()),
        ));
        Ok((cleaned, report))
    }

    fn compute_window(
        &self,
        window: TimeWindow,
        frame: &DataFrame,
        summary: &mut RunSummary,
    ) -> Result<WindowMetrics> {
        let config = &self.config;
        let metrics = FairnessEngine::compute(
            frame,
            &config.columns.sensitive_column,
            &config.ground_truth_column,
            &config.predicted_column,
        )?;
        summary.add_action(PipelineAction::new(
            ActionType::MetricsComputed,
            window.display_name(),
            format!("{} groups over {} rows", metrics.rows.len(), frame.height()),
        ));

        let parity = match &config.parity_reference_groups {
            Some(groups) => self.window_parity(window, &metrics, groups, summary)?,
            None => None,
        };

        Ok(WindowMetrics {
            window,
            rows: frame.height(),
            metrics,
            parity,
        })
    }

    /// A missing reference group is fatal for the full window only.
    fn window_parity(
        &self,
        window: TimeWindow,
        metrics: &FairnessTable,
        groups: &ReferenceGroups,
        summary: &mut RunSummary,
    ) -> Result<Option<ParityRatio>> {
        match demographic_parity_ratio(metrics, &groups.group_a, &groups.group_b) {
            Ok(parity) => {
                summary.add_action(PipelineAction::new(
                    ActionType::ParityComputed,
                    window.display_name(),
                    match parity.ratio.value() {
                        Some(ratio) => format!(
                            "{} / {} = {:.4}",
                            parity.group_a, parity.group_b, ratio
                        ),
                        None => format!(
                            "{} / {} is undefined ({} has no ordered records)",
                            parity.group_a, parity.group_b, parity.group_b
                        ),
                    },
                ));
                Ok(Some(parity))
            }
            Err(EquityError::EmptyGroup(group)) if window != TimeWindow::All => {
                warn!(
                    "Group '{}' has no rows in the {} window, parity skipped",
                    group,
                    window.display_name()
                );
                summary.add_warning(format!(
                    "Group '{}' has no rows in the {} window",
                    group,
                    window.display_name()
                ));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Builder for an [`EquityPipeline`].
#[derive(Default)]
pub struct EquityPipelineBuilder {
    config: Option<EquityConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(EquityPipelineBuilder: Send);

impl EquityPipelineBuilder {
    pub fn config(mut self, config: EquityConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a custom progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// ```rust,ignore
    /// let pipeline = EquityPipeline::builder()
    ///     .on_progress(|update| {
    ///         println!("[{:.0}%] {:?}: {}", update.progress * 100.0, update.stage, update.message);
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<EquityPipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(EquityPipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}
