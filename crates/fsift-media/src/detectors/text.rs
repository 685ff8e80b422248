//! On-screen text detection with optional recognition.
//!
//! A DB-style detection model produces a per-pixel text probability map;
//! thresholding and contour extraction turn it into polygonal regions.
//! The score mixes how much of the frame is covered by text with how much
//! the regions changed since the previous frame.

use std::sync::{Arc, Mutex};

use fsift_models::{text::bounding_rect, TextDetectorConfig, TextRegion, TextResult};
use image::imageops;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::pixel::{contour_area, fill_polygon, find_external_contours};
use crate::preprocess::{letterbox_to_tensor, to_nchw, UNIT_STD, ZERO_MEAN};
use crate::registry::{ModelRegistry, TEXT_DET_MODEL, TEXT_REC_MODEL};
use crate::resource::{CachedTensor, FrameResource, TensorVariant};

/// Contours below this area (letterboxed pixels) are noise.
const MIN_CONTOUR_AREA: f32 = 10.0;
/// Regions thinner than this (original pixels) are dropped.
const MIN_REGION_EDGE: f32 = 4.0;
/// IoU at which a region counts as unchanged between frames.
const MATCH_IOU: f32 = 0.5;

/// Stateful text detector.
pub struct TextDetector {
    registry: Arc<ModelRegistry>,
    config: TextDetectorConfig,
    previous_regions: Mutex<Vec<TextRegion>>,
}

impl TextDetector {
    pub fn new(registry: Arc<ModelRegistry>, config: TextDetectorConfig) -> Self {
        Self {
            registry,
            config,
            previous_regions: Mutex::new(Vec::new()),
        }
    }

    /// Detect text regions and score coverage plus change.
    pub fn detect(&self, resource: &FrameResource) -> MediaResult<TextResult> {
        let (height, width) = (self.config.det_input_height, self.config.det_input_width);
        let tensor = resource.get_or_generate(
            TensorVariant::TextDet { height, width },
            |rgb| {
                let (data, info) = letterbox_to_tensor(rgb, width, height, ZERO_MEAN, UNIT_STD)?;
                Ok(CachedTensor {
                    data: Arc::new(data),
                    letterbox: Some(info),
                })
            },
        )?;
        let letterbox = tensor
            .letterbox
            .ok_or_else(|| MediaError::internal("text tensor missing letterbox info"))?;

        let shape = [1, 3, height as usize, width as usize];
        let outputs = self.registry.infer(TEXT_DET_MODEL, &tensor.data, &shape)?;
        let prob_map = outputs
            .first()
            .ok_or_else(|| MediaError::inference("text model returned no output"))?;

        let expected = height as usize * width as usize;
        if prob_map.len() != expected {
            return Err(MediaError::DetectionFailed(format!(
                "text output size mismatch: expected {expected}, got {}",
                prob_map.len()
            )));
        }

        let polygons = self.extract_polygons(prob_map, &letterbox);
        debug!(count = polygons.len(), "Text polygons");

        if polygons.is_empty() {
            self.previous_regions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
            return Ok(TextResult::default());
        }

        let frame = resource.frame();
        let regions = self.build_regions(resource, polygons);
        let coverage_ratio = coverage_ratio(&regions, frame.width, frame.height);

        let mut previous = self.previous_regions.lock().unwrap_or_else(|e| e.into_inner());
        let change_ratio = change_ratio(&regions, &previous);
        *previous = regions.clone();
        drop(previous);

        let score =
            (self.config.alpha * coverage_ratio + self.config.beta * change_ratio).clamp(0.0, 1.0);

        Ok(TextResult {
            score,
            regions,
            coverage_ratio,
            change_ratio,
        })
    }

    /// Forget the previous frame's regions.
    pub fn reset(&self) {
        self.previous_regions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Threshold the probability map, trace contours and map them back to
    /// original-frame coordinates.
    fn extract_polygons(
        &self,
        prob_map: &[f32],
        letterbox: &crate::preprocess::LetterboxInfo,
    ) -> Vec<Vec<(f32, f32)>> {
        let width = self.config.det_input_width as usize;
        let height = self.config.det_input_height as usize;

        let mask: Vec<u8> = prob_map
            .iter()
            .map(|&p| if p > self.config.det_threshold { 255 } else { 0 })
            .collect();

        find_external_contours(&mask, width, height)
            .into_iter()
            .filter(|contour| contour_area(contour) >= MIN_CONTOUR_AREA)
            .map(|contour| {
                contour
                    .into_iter()
                    .map(|(x, y)| letterbox.unmap_point(x as f32, y as f32))
                    .collect()
            })
            .collect()
    }

    fn build_regions(
        &self,
        resource: &FrameResource,
        polygons: Vec<Vec<(f32, f32)>>,
    ) -> Vec<TextRegion> {
        let frame = resource.frame();
        let recognize =
            self.config.enable_recognition && self.registry.has_model(TEXT_REC_MODEL);
        let mut regions = Vec::with_capacity(polygons.len());

        for polygon in polygons {
            let bbox = bounding_rect(&polygon).clip_to(frame.width, frame.height);
            if bbox.width < MIN_REGION_EDGE || bbox.height < MIN_REGION_EDGE {
                continue;
            }

            let mut region = TextRegion {
                polygon,
                bounding_box: bbox,
                confidence: 1.0,
                text: String::new(),
            };
            if recognize {
                region.text = self
                    .recognize_region(resource, &region)
                    .unwrap_or_else(|error| {
                        warn!(%error, "Text recognition failed");
                        String::new()
                    });
            }
            regions.push(region);
        }

        regions
    }

    /// Run the recognition model over a region crop.
    fn recognize_region(
        &self,
        resource: &FrameResource,
        region: &TextRegion,
    ) -> MediaResult<String> {
        let rgb = resource.rgb()?;
        let bbox = &region.bounding_box;
        let crop = imageops::crop_imm(
            rgb,
            bbox.x as u32,
            bbox.y as u32,
            (bbox.width as u32).max(1),
            (bbox.height as u32).max(1),
        )
        .to_image();

        // Aspect-preserving resize into the fixed recognition canvas,
        // left-aligned with black padding on the right.
        let target_h = self.config.rec_input_height;
        let target_w = self.config.rec_input_width;
        let aspect = crop.width() as f32 / crop.height().max(1) as f32;
        let new_w = ((target_h as f32 * aspect) as u32).clamp(1, target_w);
        let resized = imageops::resize(&crop, new_w, target_h, imageops::FilterType::Triangle);
        let mut canvas = image::RgbImage::new(target_w, target_h);
        imageops::overlay(&mut canvas, &resized, 0, 0);

        let tensor = to_nchw(&canvas, ZERO_MEAN, UNIT_STD);
        let shape = [1, 3, target_h as usize, target_w as usize];
        let outputs = self.registry.infer(TEXT_REC_MODEL, &tensor, &shape)?;

        if outputs.first().map_or(true, |o| o.is_empty()) {
            return Ok(String::new());
        }
        // TODO: CTC decode with the recognition dictionary instead of the
        // placeholder label.
        Ok("[Text]".to_string())
    }
}

/// Fraction of frame pixels covered by the union of the text polygons.
fn coverage_ratio(regions: &[TextRegion], frame_width: u32, frame_height: u32) -> f32 {
    if regions.is_empty() || frame_width == 0 || frame_height == 0 {
        return 0.0;
    }

    let mut mask = vec![0u8; frame_width as usize * frame_height as usize];
    for region in regions {
        fill_polygon(&mut mask, frame_width, frame_height, &region.polygon);
    }

    let covered = mask.iter().filter(|&&v| v != 0).count();
    covered as f32 / (frame_width as f32 * frame_height as f32)
}

/// 1 minus the fraction of regions that persisted, over
/// `max(|current|, |previous|)`. Each previous region matches at most one
/// current region.
fn change_ratio(current: &[TextRegion], previous: &[TextRegion]) -> f32 {
    if previous.is_empty() {
        return if current.is_empty() { 0.0 } else { 1.0 };
    }
    if current.is_empty() {
        return 1.0;
    }

    let mut prev_used = vec![false; previous.len()];
    let mut matches = 0usize;
    for region in current {
        for (index, prev) in previous.iter().enumerate() {
            if prev_used[index] {
                continue;
            }
            if region.bounding_box.iou(&prev.bounding_box) >= MATCH_IOU {
                prev_used[index] = true;
                matches += 1;
                break;
            }
        }
    }

    let n = current.len().max(previous.len());
    1.0 - matches as f32 / n as f32
}
