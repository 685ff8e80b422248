//! Per-frame and service-wide analysis context.

use serde::{Deserialize, Serialize};

/// Analysis context: per-frame fields filled by the receive stage, plus
/// process-wide counters maintained by the service under its own lock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub frame_index: u32,
    /// Seconds since capture start.
    pub timestamp: f64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Frames accepted by the receive stage since start.
    pub total_frames_analyzed: u64,
    /// Running mean of final scores over all scored frames.
    pub average_final_score: f32,
}

impl AnalysisContext {
    /// Fold one final score into the running average.
    pub fn record_score(&mut self, final_score: f32, scored_frames: u64) {
        if scored_frames == 0 {
            self.average_final_score = final_score;
        } else {
            let n = scored_frames as f32;
            self.average_final_score = (self.average_final_score * n + final_score) / (n + 1.0);
        }
    }
}
