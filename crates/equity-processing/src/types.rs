use crate::filter::FrequencyFilterReport;
use crate::metrics::{FairnessTable, ParityRatio};
use crate::normalizer::NormalizationReport;
use crate::outliers::OutlierReport;
use crate::partition::PartitionSummary;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

// ============================================================================
// Rates
// ============================================================================

/// A ratio whose denominator may be zero.
///
/// `Undefined` is the zero-denominator sentinel. It serializes as `null`,
/// so consumers can tell it apart from a genuine `0.0`. Use
/// [`Rate::value_or_zero`] where a plain number is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Rate {
    Defined(f64),
    Undefined,
}

impl Rate {
    /// `numerator / denominator`, or `Undefined` when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
            Rate::Undefined
        } else {
            Rate::Defined(numerator / denominator)
        }
    }

    /// Fraction of two counts.
    pub fn from_counts(numerator: usize, denominator: usize) -> Self {
        Self::ratio(numerator as f64, denominator as f64)
    }

    /// Fraction of two counts scaled to a percentage.
    pub fn percentage(numerator: usize, denominator: usize) -> Self {
        Self::ratio(numerator as f64 * 100.0, denominator as f64)
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Rate::Defined(v) => Rate::Defined(f(v)),
            Rate::Undefined => Rate::Undefined,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Rate::Defined(v) => Some(*v),
            Rate::Undefined => None,
        }
    }

    /// The value, with the sentinel resolved to 0.
    pub fn value_or_zero(&self) -> f64 {
        self.value().unwrap_or(0.0)
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Rate::Defined(_))
    }
}

impl From<Option<f64>> for Rate {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Rate::Undefined, Rate::Defined)
    }
}

impl From<Rate> for Option<f64> {
    fn from(rate: Rate) -> Self {
        rate.value()
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Time window the metrics engine was run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// Every record that survived filtering, regardless of date.
    All,
    /// Records dated strictly before the cutoff.
    Before,
    /// Records dated on or after the cutoff.
    After,
}

impl TimeWindow {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::All => "All Data",
            Self::Before => "Before Cutoff",
            Self::After => "After Cutoff",
        }
    }
}

/// Metrics and parity for one time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub window: TimeWindow,
    /// Rows the engine saw for this window.
    pub rows: usize,
    pub metrics: FairnessTable,
    /// `None` when parity is not configured or a reference group is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity: Option<ParityRatio>,
}

// ============================================================================
// Pipeline Output
// ============================================================================

/// Serializable result of one pipeline run, for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityReport {
    pub normalization: NormalizationReport,
    /// `None` when no numeric column is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierReport>,
    pub frequency: FrequencyFilterReport,
    pub partition: PartitionSummary,
    /// One entry per window, in `All`, `Before`, `After` order.
    pub windows: Vec<WindowMetrics>,
    /// Percentage change of the parity ratio from before to after.
    pub parity_delta_pct: Rate,
    pub summary: RunSummary,
}

impl EquityReport {
    /// Metrics for a given window.
    pub fn window(&self, window: TimeWindow) -> Option<&WindowMetrics> {
        self.windows.iter().find(|w| w.window == window)
    }
}

/// Tables and report produced by [`crate::EquityPipeline::run`].
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Normalized table after outlier removal and frequency filtering.
    pub table: DataFrame,
    pub before: DataFrame,
    pub after: DataFrame,
    pub report: EquityReport,
}

// ============================================================================
// Run Summary
// ============================================================================

/// Human-readable summary of what the pipeline did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    /// Number of rows received.
    pub rows_before: usize,
    /// Number of rows left after outlier removal and frequency filtering.
    pub rows_after: usize,
    /// Number of rows removed.
    pub rows_removed: usize,

    /// Audit trail of actions taken.
    pub actions: Vec<PipelineAction>,

    /// Warnings and notes generated during the run.
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: PipelineAction) {
        self.actions.push(action);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Calculate the percentage of rows removed.
    pub fn rows_removed_percentage(&self) -> f32 {
        if self.rows_before == 0 {
            0.0
        } else {
            (self.rows_removed as f32 / self.rows_before as f32) * 100.0
        }
    }
}

/// A single action taken during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineAction {
    /// Type of action performed.
    pub action_type: ActionType,
    /// Target of the action (column name or "dataset").
    pub target: String,
    /// Human-readable description of the action.
    pub description: String,
    /// Additional details (e.g. dropped categories, flagged ids).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PipelineAction {
    pub fn new(
        action_type: ActionType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            target: target.into(),
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Types of actions recorded in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Indicator columns were derived.
    IndicatorsDerived,
    /// Outliers were flagged.
    OutliersDetected,
    /// Rows flagged as outliers were removed.
    OutliersRemoved,
    /// Rare categories were dropped.
    CategoriesDropped,
    /// Rows were excluded because of missing or unparseable values.
    RowsExcluded,
    /// The table was split around the cutoff date.
    TablePartitioned,
    /// Group metrics were computed for a window.
    MetricsComputed,
    /// A demographic parity ratio was computed.
    ParityComputed,
}

impl ActionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::IndicatorsDerived => "Indicators Derived",
            Self::OutliersDetected => "Outliers Detected",
            Self::OutliersRemoved => "Outliers Removed",
            Self::CategoriesDropped => "Categories Dropped",
            Self::RowsExcluded => "Rows Excluded",
            Self::TablePartitioned => "Table Partitioned",
            Self::MetricsComputed => "Metrics Computed",
            Self::ParityComputed => "Parity Computed",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
