//! Fairness metrics: per-group rates, confusion counts and demographic parity.

mod engine;
mod parity;

pub use engine::{FairnessEngine, FairnessTable, GroupMetrics};
pub use parity::{ParityRatio, demographic_parity_ratio, parity_delta};
