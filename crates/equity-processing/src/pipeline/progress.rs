//! Progress reporting for the equity pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use equity_processing::EquityPipeline;
//!
//! let output = EquityPipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run(df)?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the equity pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Validating configuration
    Initializing,
    /// Deriving the indicator columns
    Normalizing,
    /// Flagging and removing numeric outliers
    OutlierDetection,
    /// Dropping rare sensitive-attribute categories
    FrequencyFiltering,
    /// Splitting around the cutoff date
    Partitioning,
    /// Group metrics and parity for each window
    MetricsComputation,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Normalizing => "Normalizing Records",
            Self::OutlierDetection => "Detecting Outliers",
            Self::FrequencyFiltering => "Filtering Categories",
            Self::Partitioning => "Partitioning by Date",
            Self::MetricsComputation => "Computing Metrics",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run spent in this stage (0.0 - 1.0).
    ///
    /// Weights of the working stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.05,
            Self::Normalizing => 0.15,
            Self::OutlierDetection => 0.20,
            Self::FrequencyFiltering => 0.15,
            Self::Partitioning => 0.15,
            Self::MetricsComputation => 0.30,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Normalizing => 0.05,
            Self::OutlierDetection => 0.20,
            Self::FrequencyFiltering => 0.40,
            Self::Partitioning => 0.55,
            Self::MetricsComputation => 0.70,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A progress event emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Optional sub-stage description (e.g. "Window: Before Cutoff")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within the current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn with_sub_stage(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            sub_stage: None,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Failed,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Receiver of progress updates.
///
/// Implementations must be `Send + Sync` so a pipeline running on a worker
/// thread can report to a UI thread.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);
