//! Scene change detection via embedding similarity.
//!
//! Embeds each frame with a classification backbone and compares the
//! embedding against the previous frame's by cosine similarity. A drop
//! below the configured threshold flags a scene change.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use fsift_models::{SceneChangeResult, SceneDetectorConfig};
use tracing::warn;

use crate::error::{MediaError, MediaResult};
use crate::preprocess::{resize_to_tensor, IMAGENET_MEAN, IMAGENET_STD};
use crate::registry::{ModelRegistry, SCENE_MODEL};
use crate::resource::{CachedTensor, FrameResource, TensorVariant};

/// Recent embeddings kept for comparison.
const MAX_FEATURE_CACHE: usize = 5;
/// Similarity mapped to score 0.
const MAX_SIMILARITY: f32 = 0.98;
/// Similarity at which the score saturates to 1.
const MIN_SIMILARITY: f32 = 0.6;

/// Stateful scene change detector.
pub struct SceneChangeDetector {
    registry: Arc<ModelRegistry>,
    config: SceneDetectorConfig,
    feature_cache: Mutex<VecDeque<Vec<f32>>>,
}

impl SceneChangeDetector {
    pub fn new(registry: Arc<ModelRegistry>, config: SceneDetectorConfig) -> Self {
        Self {
            registry,
            config,
            feature_cache: Mutex::new(VecDeque::new()),
        }
    }

    /// Embed the frame and compare against the previous embedding.
    pub fn detect(&self, resource: &FrameResource) -> MediaResult<SceneChangeResult> {
        let size = self.config.input_size;
        let tensor = resource.get_or_generate(TensorVariant::Scene { size }, |rgb| {
            Ok(CachedTensor {
                data: Arc::new(resize_to_tensor(rgb, size, size, IMAGENET_MEAN, IMAGENET_STD)),
                letterbox: None,
            })
        })?;

        let shape = [1, 3, size as usize, size as usize];
        let outputs = self.registry.infer(SCENE_MODEL, &tensor.data, &shape)?;
        let feature = outputs
            .into_iter()
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| MediaError::inference("scene model returned no feature"))?;

        if feature.len() != self.config.feature_dim as usize {
            warn!(
                got = feature.len(),
                expected = self.config.feature_dim,
                "Scene feature dimension mismatch"
            );
        }

        // State is touched only after inference finished.
        let mut cache = self.feature_cache.lock().unwrap_or_else(|e| e.into_inner());

        let result = match cache.back() {
            Some(previous) => {
                let similarity = cosine_similarity(previous, &feature);
                SceneChangeResult {
                    is_scene_change: similarity < self.config.similarity_threshold,
                    similarity,
                    score: normalize_score(similarity),
                    feature: feature.clone(),
                }
            }
            None => SceneChangeResult {
                is_scene_change: false,
                similarity: 1.0,
                score: 0.0,
                feature: feature.clone(),
            },
        };

        if self.config.enable_cache {
            cache.push_back(feature);
            if cache.len() > MAX_FEATURE_CACHE {
                cache.pop_front();
            }
        }

        Ok(result)
    }

    /// Forget all cached embeddings; the next frame is "first frame ever".
    pub fn reset(&self) {
        self.feature_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Map similarity into a change score: 0.98 and above scores 0, 0.6 and
/// below saturates to 1.
fn normalize_score(similarity: f32) -> f32 {
    ((MAX_SIMILARITY - similarity) / (MAX_SIMILARITY - MIN_SIMILARITY)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StubBackend;
    use fsift_models::Frame;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resource() -> FrameResource {
        FrameResource::new(Frame::new(0, 0, 8, 8, 3, vec![50; 8 * 8 * 3]))
    }

    fn detector_with_features(features: Vec<Vec<f32>>) -> SceneChangeDetector {
        let counter = AtomicUsize::new(0);
        let registry = StubBackend::new()
            .register(SCENE_MODEL, move |_, _| {
                let index = counter.fetch_add(1, Ordering::SeqCst).min(features.len() - 1);
                Ok(vec![features[index].clone()])
            })
            .into_registry();
        SceneChangeDetector::new(
            Arc::new(registry),
            SceneDetectorConfig {
                feature_dim: 4,
                input_size: 8,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_first_frame_is_not_a_change() {
        let detector = detector_with_features(vec![vec![1.0, 0.0, 0.0, 0.0]]);
        let result = detector.detect(&resource()).unwrap();
        assert!(!result.is_scene_change);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_orthogonal_feature_flags_change() {
        let detector = detector_with_features(vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
        ]);
        detector.detect(&resource()).unwrap();
        let result = detector.detect(&resource()).unwrap();
        assert!(result.is_scene_change);
        assert!(result.similarity.abs() < 1e-6);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_identical_feature_is_stable() {
        let detector = detector_with_features(vec![vec![0.5, 0.5, 0.5, 0.5]]);
        detector.detect(&resource()).unwrap();
        let result = detector.detect(&resource()).unwrap();
        assert!(!result.is_scene_change);
        assert!((result.similarity - 1.0).abs() < 1e-5);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_reset_restores_first_frame_semantics() {
        let detector = detector_with_features(vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
        ]);
        detector.detect(&resource()).unwrap();
        detector.reset();
        detector.reset(); // idempotent
        let result = detector.detect(&resource()).unwrap();
        assert!(!result.is_scene_change);
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn test_cache_disabled_never_compares() {
        let registry = StubBackend::new()
            .register_constant(SCENE_MODEL, vec![vec![1.0, 0.0, 0.0, 0.0]])
            .into_registry();
        let detector = SceneChangeDetector::new(
            Arc::new(registry),
            SceneDetectorConfig {
                feature_dim: 4,
                input_size: 8,
                enable_cache: false,
                ..Default::default()
            },
        );
        detector.detect(&resource()).unwrap();
        let result = detector.detect(&resource()).unwrap();
        // Nothing cached, so every frame looks like the first.
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn test_normalize_score_bounds() {
        assert_eq!(normalize_score(0.99), 0.0);
        assert_eq!(normalize_score(0.98), 0.0);
        assert_eq!(normalize_score(0.6), 1.0);
        assert_eq!(normalize_score(0.2), 1.0);
        let mid = normalize_score(0.79);
        assert!(mid > 0.49 && mid < 0.51);
    }

    #[test]
    fn test_missing_model_errors() {
        let detector = SceneChangeDetector::new(
            Arc::new(StubBackend::new().into_registry()),
            SceneDetectorConfig {
                input_size: 8,
                ..Default::default()
            },
        );
        assert!(detector.detect(&resource()).is_err());
    }
}
