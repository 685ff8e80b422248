//! Per-frame resource with memoized preprocessing.
//!
//! The three detectors share one `FrameResource` for the duration of a
//! single analyze call. Each preprocessed tensor variant is computed once
//! per frame and cached under a typed key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use fsift_models::Frame;
use image::RgbImage;

use crate::error::{MediaError, MediaResult};
use crate::preprocess::{frame_to_rgb, LetterboxInfo};

/// Identifies one preprocessing recipe applied to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorVariant {
    /// Plain resize to `size x size` with ImageNet normalization.
    Scene { size: u32 },
    /// Letterbox to `size x size` with ImageNet normalization.
    Motion { size: u32 },
    /// Letterbox to `height x width` with 1/255 scaling.
    TextDet { height: u32, width: u32 },
}

/// A cached preprocessed tensor plus its letterbox mapping, when the
/// recipe letterboxes.
#[derive(Debug, Clone)]
pub struct CachedTensor {
    pub data: Arc<Vec<f32>>,
    pub letterbox: Option<LetterboxInfo>,
}

/// Owns a decoded frame and memoizes its preprocessed tensor variants.
pub struct FrameResource {
    frame: Frame,
    rgb: OnceLock<Result<RgbImage, String>>,
    cache: Mutex<HashMap<TensorVariant, CachedTensor>>,
}

impl FrameResource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            rgb: OnceLock::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The original frame descriptor and pixels.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The frame decoded to RGB, computed once.
    pub fn rgb(&self) -> MediaResult<&RgbImage> {
        let entry = self
            .rgb
            .get_or_init(|| frame_to_rgb(&self.frame).map_err(|e| e.to_string()));
        entry
            .as_ref()
            .map_err(|message| MediaError::preprocess(message.clone()))
    }

    /// Fetch the tensor for `variant`, generating it on first request.
    ///
    /// The generator runs outside the cache lock; the single-reader-per-
    /// variant contract keeps duplicate work from happening in practice.
    pub fn get_or_generate<F>(&self, variant: TensorVariant, generate: F) -> MediaResult<CachedTensor>
    where
        F: FnOnce(&RgbImage) -> MediaResult<CachedTensor>,
    {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&variant)
        {
            return Ok(hit.clone());
        }

        let tensor = generate(self.rgb()?)?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cache.entry(variant).or_insert(tensor).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resource() -> FrameResource {
        FrameResource::new(Frame::new(0, 0, 8, 8, 3, vec![100; 8 * 8 * 3]))
    }

    #[test]
    fn test_generate_runs_once_per_variant() {
        let resource = resource();
        let calls = AtomicUsize::new(0);
        let variant = TensorVariant::Scene { size: 4 };

        for _ in 0..3 {
            let tensor = resource
                .get_or_generate(variant, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedTensor {
                        data: Arc::new(vec![1.0; 48]),
                        letterbox: None,
                    })
                })
                .unwrap();
            assert_eq!(tensor.data.len(), 48);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_variants_cached_independently() {
        let resource = resource();
        resource
            .get_or_generate(TensorVariant::Scene { size: 4 }, |_| {
                Ok(CachedTensor {
                    data: Arc::new(vec![1.0]),
                    letterbox: None,
                })
            })
            .unwrap();
        let motion = resource
            .get_or_generate(TensorVariant::Motion { size: 4 }, |_| {
                Ok(CachedTensor {
                    data: Arc::new(vec![2.0]),
                    letterbox: None,
                })
            })
            .unwrap();
        assert_eq!(motion.data[0], 2.0);
    }

    #[test]
    fn test_generator_error_propagates_and_is_not_cached() {
        let resource = resource();
        let variant = TensorVariant::TextDet {
            height: 4,
            width: 4,
        };
        let first = resource.get_or_generate(variant, |_| Err(MediaError::preprocess("boom")));
        assert!(first.is_err());

        let second = resource.get_or_generate(variant, |_| {
            Ok(CachedTensor {
                data: Arc::new(vec![3.0]),
                letterbox: None,
            })
        });
        assert!(second.is_ok());
    }

    #[test]
    fn test_malformed_frame_fails_rgb() {
        let resource = FrameResource::new(Frame::new(0, 0, 8, 8, 3, vec![0; 5]));
        assert!(resource.rgb().is_err());
        let result = resource.get_or_generate(TensorVariant::Scene { size: 4 }, |_| {
            unreachable!("generator must not run without pixels")
        });
        assert!(result.is_err());
    }
}
