//! Score fusion: dynamic weights, boosts and temporal smoothing.

pub mod calculator;
pub mod scorer;

pub use calculator::{ActivationStats, DynamicWeightCalculator};
pub use scorer::FrameScorer;
