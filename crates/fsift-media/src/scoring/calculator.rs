//! Dynamic fusion-weight calculator.
//!
//! Adapts the three fusion weights to recent detector activity: a
//! dimension that has been scoring high gets pushed above its base
//! weight. History is a bounded window with a running sum so the average
//! stays O(1) per update.

use std::collections::VecDeque;

use fsift_models::{DynamicCalculatorConfig, MultiDimensionScore};
use tracing::warn;

/// Snapshot returned by every update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationStats {
    /// Blended activation per dimension:
    /// `alpha * current + (1 - alpha) * history_avg`.
    pub activations: [f32; 3],
    /// Weights after normalization and clamping.
    pub weights: [f32; 3],
    pub history_avg: [f32; 3],
}

/// Stateful weight calculator. Not internally locked; the scorer owns it
/// behind its own lock.
pub struct DynamicWeightCalculator {
    config: DynamicCalculatorConfig,
    history: VecDeque<[f32; 3]>,
    running_sum: [f32; 3],
    current_weights: [f32; 3],
}

impl DynamicWeightCalculator {
    pub fn new(config: DynamicCalculatorConfig) -> Self {
        let current_weights = config.base_weights;
        Self {
            config,
            history: VecDeque::new(),
            running_sum: [0.0; 3],
            current_weights,
        }
    }

    /// Fold one frame's scores into the history and recompute weights.
    pub fn update(&mut self, scores: &MultiDimensionScore) -> ActivationStats {
        let current = [scores.scene_score, scores.motion_score, scores.text_score];

        self.history.push_back(current);
        for i in 0..3 {
            self.running_sum[i] += current[i];
        }
        if self.history.len() > self.config.history_window_size as usize {
            if let Some(oldest) = self.history.pop_front() {
                for i in 0..3 {
                    self.running_sum[i] -= oldest[i];
                }
            }
        }

        let inv_len = 1.0 / self.history.len() as f32;
        let mut history_avg = [0.0f32; 3];
        for i in 0..3 {
            history_avg[i] = self.running_sum[i] * inv_len;
        }

        let alpha = self.config.current_frame_weight;
        let beta = self.config.activation_influence;

        let mut activations = [0.0f32; 3];
        let mut raw = [0.0f32; 3];
        for i in 0..3 {
            // Activation blends the current frame with the history average;
            // the raw weight scales the base weight by it.
            activations[i] = alpha * current[i] + (1.0 - alpha) * history_avg[i];
            raw[i] = self.config.base_weights[i] * (1.0 + beta * activations[i]);
        }

        self.current_weights = self.normalize(raw);

        ActivationStats {
            activations,
            weights: self.current_weights,
            history_avg,
        }
    }

    /// Normalize to sum 1, then clamp each element into
    /// `[min_weight, max_weight]`. The clamp is deliberately not followed
    /// by a renormalization, so the sum may drift slightly.
    fn normalize(&self, raw: [f32; 3]) -> [f32; 3] {
        let sum: f32 = raw.iter().sum();
        if sum < 1e-6 {
            warn!("Sum of raw weights is too small, falling back to base weights");
            return self.config.base_weights;
        }

        let mut normalized = raw;
        for weight in &mut normalized {
            *weight = (*weight / sum).clamp(self.config.min_weight, self.config.max_weight);
        }
        normalized
    }

    pub fn current_weights(&self) -> [f32; 3] {
        self.current_weights
    }

    /// Clear the history and return to the base weights.
    pub fn reset(&mut self) {
        self.history.clear();
        self.running_sum = [0.0; 3];
        self.current_weights = self.config.base_weights;
    }
}
