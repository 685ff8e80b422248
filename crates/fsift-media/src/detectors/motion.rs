//! Object motion detection: YOLO-style proposals, IoU tracking and frame
//! differencing fused into one motion score.

use std::sync::{Arc, Mutex};

use fsift_models::{BoundingBox, MotionDetectorConfig, MotionResult};
use image::GrayImage;
use ndarray::ArrayView2;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::pixel::{absdiff_threshold, count_nonzero, dilate3x3, downscale_gray_blur, erode3x3};
use crate::preprocess::{letterbox_to_tensor, LetterboxInfo, IMAGENET_MEAN, IMAGENET_STD};
use crate::registry::{ModelRegistry, MOTION_MODEL};
use crate::resource::{CachedTensor, FrameResource, TensorVariant};

use super::tracker::{Detection, IouTracker};

const NUM_CLASSES: usize = 80;
const NUM_PROPOSALS: usize = 8400;

/// Frame differencing runs on a fixed small canvas.
const DIFF_WIDTH: u32 = 640;
const DIFF_HEIGHT: u32 = 360;
/// Binarization threshold on the blurred absolute difference.
const DIFF_THRESHOLD: u8 = 25;
/// Gain applied to the changed-pixel ratio before clipping to 1.
const DIFF_GAIN: f32 = 50.0;
/// Sigma of a 5x5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;

// Object-motion mix: track count, mean speed, track churn.
const COUNT_WEIGHT: f32 = 0.3;
const SPEED_WEIGHT: f32 = 0.5;
const CHURN_WEIGHT: f32 = 0.2;

struct MotionState {
    tracker: IouTracker,
    prev_gray: Option<GrayImage>,
}

/// Stateful motion detector.
pub struct MotionDetector {
    registry: Arc<ModelRegistry>,
    config: MotionDetectorConfig,
    state: Mutex<MotionState>,
}

impl MotionDetector {
    pub fn new(registry: Arc<ModelRegistry>, config: MotionDetectorConfig) -> Self {
        let tracker = IouTracker::new(
            config.track_high_threshold,
            config.track_buffer_size,
            config.max_tracked_objects as usize,
        );
        Self {
            registry,
            config,
            state: Mutex::new(MotionState {
                tracker,
                prev_gray: None,
            }),
        }
    }

    /// Detect objects, update tracks and fuse the motion score.
    pub fn detect(&self, resource: &FrameResource) -> MediaResult<MotionResult> {
        let size = self.config.input_width;
        let tensor = resource.get_or_generate(TensorVariant::Motion { size }, |rgb| {
            let (data, info) =
                letterbox_to_tensor(rgb, size, size, IMAGENET_MEAN, IMAGENET_STD)?;
            Ok(CachedTensor {
                data: Arc::new(data),
                letterbox: Some(info),
            })
        })?;
        let letterbox = tensor
            .letterbox
            .ok_or_else(|| MediaError::internal("motion tensor missing letterbox info"))?;

        let shape = [1, 3, size as usize, size as usize];
        let outputs = self.registry.infer(MOTION_MODEL, &tensor.data, &shape)?;
        let output = outputs
            .first()
            .ok_or_else(|| MediaError::inference("motion model returned no output"))?;

        let frame = resource.frame();
        let detections = self.decode_proposals(output, &letterbox, frame.width, frame.height)?;
        debug!(count = detections.len(), "Motion detections after NMS");

        // Gray conversion happens before taking the state lock.
        let gray = downscale_gray_blur(resource.rgb()?, DIFF_WIDTH, DIFF_HEIGHT, BLUR_SIGMA);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let pixel_motion = match state.prev_gray.take() {
            Some(previous) if previous.dimensions() == gray.dimensions() => {
                let diff = absdiff_threshold(&previous, &gray, DIFF_THRESHOLD);
                let cleaned = dilate3x3(&erode3x3(&diff));
                let total = (DIFF_WIDTH * DIFF_HEIGHT) as f32;
                let ratio = count_nonzero(&cleaned) as f32 / total;
                (ratio * DIFF_GAIN).min(1.0)
            }
            _ => 0.0,
        };
        state.prev_gray = Some(gray);

        let delta = state.tracker.update(&detections);
        let tracks = state.tracker.active_tracks().to_vec();
        let avg_velocity = state.tracker.average_speed();
        drop(state);

        let count_score = (tracks.len() as f32 / 10.0).min(1.0);
        let speed_score = (avg_velocity / 20.0).min(1.0);
        let churn_score = ((delta.new_tracks + delta.lost_tracks) as f32 / 10.0).min(1.0);
        let object_motion =
            COUNT_WEIGHT * count_score + SPEED_WEIGHT * speed_score + CHURN_WEIGHT * churn_score;

        let score = (self.config.pixel_motion_weight * pixel_motion
            + self.config.object_motion_weight * object_motion)
            .min(1.0);

        Ok(MotionResult {
            score,
            tracks,
            new_tracks: delta.new_tracks,
            lost_tracks: delta.lost_tracks,
            avg_velocity,
            pixel_motion,
        })
    }

    /// Drop tracker state and the previous gray frame.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.tracker.reset();
        state.prev_gray = None;
    }

    /// Decode `(4 + classes) x proposals` output into detections in
    /// original-frame coordinates, then suppress overlaps.
    fn decode_proposals(
        &self,
        output: &[f32],
        letterbox: &LetterboxInfo,
        frame_width: u32,
        frame_height: u32,
    ) -> MediaResult<Vec<Detection>> {
        let expected = (NUM_CLASSES + 4) * NUM_PROPOSALS;
        if output.len() < expected {
            return Err(MediaError::DetectionFailed(format!(
                "motion output size mismatch: expected {expected}, got {}",
                output.len()
            )));
        }

        // Output layout is (4 + classes) x proposals; transpose to walk
        // proposal rows.
        let planes = ArrayView2::from_shape((NUM_CLASSES + 4, NUM_PROPOSALS), &output[..expected])
            .map_err(|e| MediaError::internal(format!("failed to view motion output: {e}")))?;
        let proposals = planes.t();

        let mut candidates = Vec::new();
        for i in 0..NUM_PROPOSALS {
            let mut best_score = 0.0f32;
            let mut best_class = 0usize;
            for c in 0..NUM_CLASSES {
                let score = proposals[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < self.config.confidence_threshold {
                continue;
            }

            let cx = proposals[[i, 0]];
            let cy = proposals[[i, 1]];
            let w = proposals[[i, 2]];
            let h = proposals[[i, 3]];

            let boxed = BoundingBox::new(cx - w / 2.0, cy - h / 2.0, w, h);
            let bbox = letterbox.unmap_box(&boxed).clip_to(frame_width, frame_height);

            candidates.push(Detection {
                bbox,
                confidence: best_score,
                class_id: best_class as i32,
            });
        }

        Ok(non_maximum_suppression(candidates, self.config.nms_threshold))
    }
}

/// Class-agnostic greedy NMS, highest confidence first.
fn non_maximum_suppression(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}
