//! Detector results and fused per-frame scores.

use serde::{Deserialize, Serialize};

use crate::text::TextRegion;
use crate::track::Track;

/// Fixed fusion weights used when dynamic weighting is disabled:
/// scene, motion, text.
pub const DEFAULT_WEIGHTS: [f32; 3] = [0.45, 0.20, 0.35];

/// Scene-change detector output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneChangeResult {
    pub is_scene_change: bool,
    /// Cosine similarity against the previous frame's feature; 1.0 on the
    /// first frame after a reset.
    pub similarity: f32,
    pub score: f32,
    /// Embedding of the current frame, kept for downstream consumers.
    pub feature: Vec<f32>,
}

impl Default for SceneChangeResult {
    fn default() -> Self {
        Self {
            is_scene_change: false,
            similarity: 1.0,
            score: 0.0,
            feature: Vec::new(),
        }
    }
}

/// Motion detector output for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionResult {
    pub score: f32,
    pub tracks: Vec<Track>,
    pub new_tracks: u32,
    pub lost_tracks: u32,
    pub avg_velocity: f32,
    pub pixel_motion: f32,
}

/// Text detector output for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextResult {
    pub score: f32,
    pub regions: Vec<TextRegion>,
    pub coverage_ratio: f32,
    pub change_ratio: f32,
}

/// The three per-dimension scores plus the raw detector results they came
/// from. Produced by the frame analyzer, consumed by the scorer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiDimensionScore {
    pub scene_score: f32,
    pub motion_score: f32,
    pub text_score: f32,
    pub scene_change_result: SceneChangeResult,
    pub motion_result: MotionResult,
    pub text_result: TextResult,
}

/// Fused score for a single frame, as it flows through the selection
/// pipeline and out to the metadata bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameScore {
    pub frame_index: u32,
    /// Seconds since capture start.
    pub timestamp: f64,
    /// Fused, boosted, smoothed score in [0, 1].
    pub final_score: f32,
    /// Per-dimension contributions: raw score times applied weight
    /// (pre-boost, pre-smoothing).
    pub scene_contribution: f32,
    pub motion_contribution: f32,
    pub text_contribution: f32,
    pub raw_scores: MultiDimensionScore,
    /// Fusion weights in effect when this frame was scored.
    pub applied_weights: [f32; 3],
}

impl FrameScore {
    /// Whether the underlying frame was flagged as a scene change.
    pub fn is_scene_change(&self) -> bool {
        self.raw_scores.scene_change_result.is_scene_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scene_result_is_first_frame() {
        let result = SceneChangeResult::default();
        assert!(!result.is_scene_change);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let sum: f32 = DEFAULT_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scene_change_flag_passthrough() {
        let mut score = FrameScore {
            frame_index: 0,
            timestamp: 0.0,
            final_score: 0.5,
            scene_contribution: 0.0,
            motion_contribution: 0.0,
            text_contribution: 0.0,
            raw_scores: MultiDimensionScore::default(),
            applied_weights: DEFAULT_WEIGHTS,
        };
        assert!(!score.is_scene_change());
        score.raw_scores.scene_change_result.is_scene_change = true;
        assert!(score.is_scene_change());
    }
}
