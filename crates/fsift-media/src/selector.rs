//! Keyframe selection.
//!
//! Pure per-batch selection: filter, rank by score, then greedily pick
//! under a count cap and a minimum temporal spacing. Scene-change frames
//! may bypass the count cap but never the temporal gate.

use fsift_models::{FrameScore, KeyframeDetectorConfig};
use tracing::debug;

/// Outcome of one selection pass.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    /// Selected frame indices, strictly increasing.
    pub keyframe_indices: Vec<u32>,
    /// Selected scores, sorted by frame index.
    pub keyframe_scores: Vec<FrameScore>,
    pub total_frames: u32,
    pub selected_frames: u32,
    pub achieved_compression_ratio: f32,
}

/// Stateless keyframe selector.
pub struct KeyframeSelector {
    config: KeyframeDetectorConfig,
}

impl KeyframeSelector {
    pub fn new(config: KeyframeDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KeyframeDetectorConfig {
        &self.config
    }

    /// Per-window dynamic target count for Top-K mode; `-1` in threshold
    /// mode (the score floor does the limiting there).
    pub fn dynamic_target(&self, window_len: usize) -> i32 {
        if self.config.use_threshold_mode {
            return -1;
        }
        let k = (window_len as f32 * self.config.target_compression_ratio) as i32;
        k.clamp(
            self.config.min_keyframe_count as i32,
            self.config.max_keyframe_count as i32,
        )
    }

    /// Select keyframes from a batch of scores.
    ///
    /// `dynamic_k > 0` overrides the configured target count.
    pub fn select_from(&self, scores: &[FrameScore], dynamic_k: i32) -> SelectionResult {
        let mut result = SelectionResult {
            total_frames: scores.last().map_or(0, |s| s.frame_index + 1),
            ..Default::default()
        };

        // 1. Pre-filter: keep scoring frames and every scene change.
        let mut candidates: Vec<&FrameScore> = scores
            .iter()
            .filter(|score| {
                score.final_score >= self.config.min_score_threshold || score.is_scene_change()
            })
            .collect();

        // 2. Rank by score, stable so equal scores keep arrival order.
        candidates.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let target = if dynamic_k > 0 {
            dynamic_k as usize
        } else {
            self.config.target_keyframe_count as usize
        };

        // 3. Greedy pick under the count cap and temporal spacing.
        let mut selected: Vec<FrameScore> = Vec::new();
        let mut selected_timestamps: Vec<f64> = Vec::new();

        for candidate in candidates {
            if selected.len() >= target
                && !(self.config.always_include_scene_changes && candidate.is_scene_change())
            {
                continue;
            }
            if !self.satisfies_temporal_distance(candidate.timestamp, &selected_timestamps) {
                continue;
            }
            selected_timestamps.push(candidate.timestamp);
            selected.push(candidate.clone());
        }

        // 4. Emit in frame order.
        selected.sort_by_key(|score| score.frame_index);
        result.keyframe_indices = selected.iter().map(|s| s.frame_index).collect();
        result.selected_frames = selected.len() as u32;
        result.keyframe_scores = selected;
        result.achieved_compression_ratio = if result.total_frames > 0 {
            result.selected_frames as f32 / result.total_frames as f32
        } else {
            0.0
        };

        debug!(
            selected = result.selected_frames,
            total = result.total_frames,
            mode = if self.config.use_threshold_mode {
                "threshold"
            } else {
                "top-k"
            },
            "Keyframe selection"
        );

        result
    }

    /// The candidate must keep its distance from every already-selected
    /// timestamp; selection order is by score, so timestamps arrive
    /// unsorted.
    fn satisfies_temporal_distance(&self, timestamp: f64, selected: &[f64]) -> bool {
        selected
            .iter()
            .all(|&t| (timestamp - t).abs() >= self.config.min_temporal_distance)
    }
}
