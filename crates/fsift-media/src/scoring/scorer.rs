//! Frame scorer: fuse the three dimension scores into one final score.
//!
//! Fusion uses either the dynamic calculator's weights or a fixed
//! fallback, then boosts for notable events and smooths over time (EMA
//! preferred, SMA fallback). Contributions recorded on the result use the
//! pre-boost raw scores and the applied weights.

use std::collections::VecDeque;
use std::sync::Mutex;

use fsift_models::{
    AnalysisContext, FrameScore, FrameScorerConfig, MultiDimensionScore, DEFAULT_WEIGHTS,
};
use tracing::trace;

use super::calculator::DynamicWeightCalculator;

/// Motion scores above this trigger the motion boost.
const MOTION_BOOST_FLOOR: f32 = 0.5;
/// Text change ratios above this trigger the text boost.
const TEXT_BOOST_FLOOR: f32 = 0.1;

struct ScorerState {
    calculator: DynamicWeightCalculator,
    ema_seeded: bool,
    last_smoothed: f32,
    sma_window: VecDeque<f32>,
    sma_sum: f32,
}

/// Thread-safe frame scorer. One instance is shared by all analysis
/// workers; scoring order within the instance is the arrival order.
pub struct FrameScorer {
    config: FrameScorerConfig,
    state: Mutex<ScorerState>,
}

impl FrameScorer {
    pub fn new(calculator: DynamicWeightCalculator, config: FrameScorerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ScorerState {
                calculator,
                ema_seeded: false,
                last_smoothed: 0.0,
                sma_window: VecDeque::new(),
                sma_sum: 0.0,
            }),
        }
    }

    /// Score one frame.
    pub fn score(&self, scores: &MultiDimensionScore, context: &AnalysisContext) -> FrameScore {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let weights = if self.config.enable_dynamic_weighting {
            state.calculator.update(scores).weights
        } else {
            DEFAULT_WEIGHTS
        };

        let fused = scores.scene_score * weights[0]
            + scores.motion_score * weights[1]
            + scores.text_score * weights[2];
        let boosted = self.apply_boosts(fused, scores);
        let smoothed = self.apply_smoothing(&mut state, boosted);
        drop(state);

        trace!(
            frame_index = context.frame_index,
            fused,
            boosted,
            smoothed,
            "Frame scored"
        );

        FrameScore {
            frame_index: context.frame_index,
            timestamp: context.timestamp,
            final_score: smoothed.clamp(0.0, 1.0),
            scene_contribution: (scores.scene_score * weights[0]).clamp(0.0, 1.0),
            motion_contribution: (scores.motion_score * weights[1]).clamp(0.0, 1.0),
            text_contribution: (scores.text_score * weights[2]).clamp(0.0, 1.0),
            raw_scores: scores.clone(),
            applied_weights: weights,
        }
    }

    /// Score a batch in order.
    pub fn score_batch(
        &self,
        batch: &[(MultiDimensionScore, AnalysisContext)],
    ) -> Vec<FrameScore> {
        batch
            .iter()
            .map(|(scores, context)| self.score(scores, context))
            .collect()
    }

    /// Clear smoothing state and reset the calculator.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.ema_seeded = false;
        state.last_smoothed = 0.0;
        state.sma_window.clear();
        state.sma_sum = 0.0;
        state.calculator.reset();
    }

    fn apply_boosts(&self, base: f32, scores: &MultiDimensionScore) -> f32 {
        let mut boosted = base;

        if self.config.scene_change_boost > 1.0 && scores.scene_change_result.is_scene_change {
            boosted *= self.config.scene_change_boost;
        }
        if self.config.motion_increase_boost > 1.0 && scores.motion_result.score > MOTION_BOOST_FLOOR
        {
            boosted *= self.config.motion_increase_boost;
        }
        if self.config.text_increase_boost > 1.0
            && scores.text_result.change_ratio > TEXT_BOOST_FLOOR
        {
            boosted *= self.config.text_increase_boost;
        }

        boosted.min(1.0)
    }

    fn apply_smoothing(&self, state: &mut ScorerState, current: f32) -> f32 {
        if !self.config.enable_smoothing {
            return current;
        }

        // EMA preferred: faster response, better separation.
        let alpha = self.config.smoothing_ema_alpha;
        if alpha > 0.0 && alpha <= 1.0 {
            state.last_smoothed = if state.ema_seeded {
                alpha * current + (1.0 - alpha) * state.last_smoothed
            } else {
                current
            };
            state.ema_seeded = true;
            return state.last_smoothed;
        }

        // SMA fallback.
        if self.config.smoothing_window_size < 2 {
            return current;
        }
        state.sma_window.push_back(current);
        state.sma_sum += current;
        if state.sma_window.len() > self.config.smoothing_window_size as usize {
            if let Some(evicted) = state.sma_window.pop_front() {
                state.sma_sum -= evicted;
            }
        }
        state.sma_sum / state.sma_window.len() as f32
    }
}
