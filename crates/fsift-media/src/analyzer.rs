//! Standard frame analyzer: the three detectors fused per frame.

use std::sync::Arc;

use fsift_models::{AnalysisContext, MultiDimensionScore};
use tracing::warn;

use crate::detectors::{MotionDetector, SceneChangeDetector, TextDetector};
use crate::resource::FrameResource;

/// Runs scene, motion and text detection for one frame and assembles a
/// `MultiDimensionScore`. Holds no state of its own; each detector owns
/// its internal state. A missing or failing detector contributes a zero
/// score and a default result.
pub struct StandardFrameAnalyzer {
    scene: Option<Arc<SceneChangeDetector>>,
    motion: Option<Arc<MotionDetector>>,
    text: Option<Arc<TextDetector>>,
}

impl StandardFrameAnalyzer {
    pub fn new(
        scene: Option<Arc<SceneChangeDetector>>,
        motion: Option<Arc<MotionDetector>>,
        text: Option<Arc<TextDetector>>,
    ) -> Self {
        Self { scene, motion, text }
    }

    /// Analyze one frame. The three detectors run concurrently, one task
    /// each; the call returns when all three finished.
    pub fn analyze(&self, resource: &FrameResource, context: &AnalysisContext) -> MultiDimensionScore {
        let frame_index = context.frame_index;
        let ((scene, motion), text) = rayon::join(
            || {
                rayon::join(
                    || {
                        self.scene.as_ref().map(|detector| {
                            detector.detect(resource).unwrap_or_else(|error| {
                                warn!(frame_index, %error, "Scene detection failed");
                                Default::default()
                            })
                        })
                    },
                    || {
                        self.motion.as_ref().map(|detector| {
                            detector.detect(resource).unwrap_or_else(|error| {
                                warn!(frame_index, %error, "Motion detection failed");
                                Default::default()
                            })
                        })
                    },
                )
            },
            || {
                self.text.as_ref().map(|detector| {
                    detector.detect(resource).unwrap_or_else(|error| {
                        warn!(frame_index, %error, "Text detection failed");
                        Default::default()
                    })
                })
            },
        );

        let mut scores = MultiDimensionScore::default();
        if let Some(result) = scene {
            // A flagged change always counts as a full-strength scene score.
            scores.scene_score = if result.is_scene_change { 1.0 } else { result.score };
            scores.scene_change_result = result;
        }
        if let Some(result) = motion {
            scores.motion_score = result.score;
            scores.motion_result = result;
        }
        if let Some(result) = text {
            scores.text_score = result.score;
            scores.text_result = result;
        }
        scores
    }

    /// Reset every configured detector.
    pub fn reset(&self) {
        if let Some(detector) = &self.scene {
            detector.reset();
        }
        if let Some(detector) = &self.motion {
            detector.reset();
        }
        if let Some(detector) = &self.text {
            detector.reset();
        }
    }
}
