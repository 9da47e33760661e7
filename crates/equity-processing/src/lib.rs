//! Equity Processing Library
//!
//! Fairness metrics over clinical encounter records, built on Polars.
//!
//! # Overview
//!
//! The pipeline takes one table of encounters and:
//!
//! - **Normalizes** it by deriving `reported`, `test_positive` and `test_ordered`
//!   indicator columns
//! - **Removes outliers** from a numeric column using IQR bounds
//! - **Filters rare categories** of the sensitive attribute
//! - **Partitions** the records around a cutoff date
//! - **Computes group metrics** (ordering rates, confusion counts, TPR/TNR/FPR)
//!   for the full table and both partitions
//! - **Compares groups** with a demographic parity ratio and its change
//!   across the cutoff
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use equity_processing::{EquityConfig, EquityPipeline, ReferenceGroups, source};
//!
//! let df = source::load_table("encounters.csv")?;
//!
//! let config = EquityConfig::builder()
//!     .partition_cutoff_date("2028-03-01")
//!     .parity_reference_groups(ReferenceGroups::new("Black", "White"))
//!     .build()?;
//!
//! let output = EquityPipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(df)?;
//!
//! for window in &output.report.windows {
//!     println!("{}: {:?}", window.window.display_name(), window.parity);
//! }
//! ```
//!
//! Each stage is also usable on its own; see [`RecordNormalizer`],
//! [`OutlierDetector`], [`FrequencyFilter`], [`TemporalPartitioner`] and
//! [`FairnessEngine`].
//!
//! # Undefined rates
//!
//! Rates with a zero denominator are [`Rate::Undefined`] rather than `0.0`
//! and serialize as `null`. Call [`Rate::value_or_zero`] where a plain number
//! is needed.

pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod normalizer;
pub mod outliers;
pub mod partition;
pub mod pipeline;
pub mod source;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ColumnRoles, ConfigValidationError, EquityConfig, EquityConfigBuilder, ReferenceGroups,
};
pub use error::{EquityError, Result as EquityResult, ResultExt};
pub use filter::{CategoryShare, FrequencyFilter, FrequencyFilterReport};
pub use metrics::{
    FairnessEngine, FairnessTable, GroupMetrics, ParityRatio, demographic_parity_ratio,
    parity_delta,
};
pub use normalizer::{NormalizationReport, RecordNormalizer};
pub use outliers::{IqrBounds, OutlierDetector, OutlierRecord, OutlierReport};
pub use partition::{Partition, PartitionSummary, TemporalPartitioner};
pub use pipeline::{
    ClosureProgressReporter, EquityPipeline, EquityPipelineBuilder, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use types::{
    ActionType, EquityReport, PipelineAction, PipelineOutput, Rate, RunSummary, TimeWindow,
    WindowMetrics,
};
pub use utils::{clean_numeric_string, is_error_marker, is_truthy_str, parse_date_str, parse_numeric_string};
