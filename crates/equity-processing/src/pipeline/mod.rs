//! Pipeline module.
//!
//! Wires the stages together and reports progress while running.

mod builder;
pub mod progress;

pub use builder::{EquityPipeline, EquityPipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
