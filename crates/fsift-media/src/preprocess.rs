//! Frame preprocessing for model inference.
//!
//! Frames come in as packed HWC bytes and leave as normalized NCHW float
//! tensors, either plainly resized (scene model) or letterboxed with the
//! scale/offset recorded for inverse mapping (motion and text models).

use fsift_models::{BoundingBox, Frame};
use image::{imageops, ImageBuffer, Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};

/// ImageNet channel means, used by the scene and motion models.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Plain 1/255 scaling for models trained without channel normalization.
pub const ZERO_MEAN: [f32; 3] = [0.0, 0.0, 0.0];
pub const UNIT_STD: [f32; 3] = [1.0, 1.0, 1.0];

/// Scale and padding applied by a letterbox resize, kept so detector
/// outputs can be mapped back to original-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_left: f32,
    pub pad_top: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl LetterboxInfo {
    /// Map a point in letterboxed coordinates back to the original frame.
    pub fn unmap_point(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_left) / self.scale, (y - self.pad_top) / self.scale)
    }

    /// Map a box in letterboxed coordinates back to the original frame.
    pub fn unmap_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let (x, y) = self.unmap_point(bbox.x, bbox.y);
        BoundingBox::new(x, y, bbox.width / self.scale, bbox.height / self.scale)
    }
}

/// Decode packed frame bytes into an RGB image buffer.
pub fn frame_to_rgb(frame: &Frame) -> MediaResult<RgbImage> {
    if !frame.is_well_formed() {
        return Err(MediaError::preprocess(format!(
            "malformed frame {}: {}x{}x{} with {} bytes",
            frame.frame_id,
            frame.width,
            frame.height,
            frame.channels,
            frame.data.len()
        )));
    }

    match frame.channels {
        3 => ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| MediaError::preprocess("pixel buffer does not fit descriptor")),
        1 => {
            let mut rgb = Vec::with_capacity(frame.data.len() * 3);
            for &value in &frame.data {
                rgb.extend_from_slice(&[value, value, value]);
            }
            ImageBuffer::from_raw(frame.width, frame.height, rgb)
                .ok_or_else(|| MediaError::preprocess("pixel buffer does not fit descriptor"))
        }
        channels => Err(MediaError::preprocess(format!(
            "unsupported channel count {channels}"
        ))),
    }
}

/// HWC image → normalized NCHW tensor: `(pixel / 255 - mean) / std`.
pub fn to_nchw(img: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut chw = vec![0.0f32; 3 * h * w];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * w + x as usize;
        for c in 0..3 {
            chw[c * h * w + idx] = (pixel[c] as f32 / 255.0 - mean[c]) / std[c];
        }
    }
    chw
}

/// Resize (ignoring aspect ratio) and normalize to NCHW.
pub fn resize_to_tensor(
    img: &RgbImage,
    width: u32,
    height: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Vec<f32> {
    let resized = imageops::resize(img, width, height, imageops::FilterType::Triangle);
    to_nchw(&resized, mean, std)
}

/// Letterbox into a `target_w x target_h` canvas (centered, black padding)
/// and normalize to NCHW. Returns the tensor and the inverse-mapping info.
pub fn letterbox_to_tensor(
    img: &RgbImage,
    target_w: u32,
    target_h: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> MediaResult<(Vec<f32>, LetterboxInfo)> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(MediaError::preprocess("empty image"));
    }

    let scale = (target_w as f32 / width as f32).min(target_h as f32 / height as f32);
    let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_w);
    let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_h);
    let pad_left = (target_w - scaled_width) / 2;
    let pad_top = (target_h - scaled_height) / 2;

    let resized = imageops::resize(
        img,
        scaled_width,
        scaled_height,
        imageops::FilterType::Triangle,
    );

    let mut canvas: RgbImage = ImageBuffer::from_pixel(target_w, target_h, Rgb([0, 0, 0]));
    imageops::overlay(&mut canvas, &resized, pad_left as i64, pad_top as i64);

    let info = LetterboxInfo {
        scale,
        pad_left: pad_left as f32,
        pad_top: pad_top as f32,
        scaled_width,
        scaled_height,
    };

    Ok((to_nchw(&canvas, mean, std), info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(
            0,
            0,
            width,
            height,
            3,
            vec![value; (width * height * 3) as usize],
        )
    }

    #[test]
    fn test_frame_to_rgb_channels() {
        let frame = solid_frame(4, 4, 128);
        let img = frame_to_rgb(&frame).unwrap();
        assert_eq!(img.dimensions(), (4, 4));

        let gray = Frame::new(0, 0, 2, 2, 1, vec![7, 8, 9, 10]);
        let img = frame_to_rgb(&gray).unwrap();
        assert_eq!(img.get_pixel(1, 1)[0], 10);
        assert_eq!(img.get_pixel(1, 1)[2], 10);
    }

    #[test]
    fn test_frame_to_rgb_rejects_malformed() {
        let frame = Frame::new(0, 0, 4, 4, 3, vec![0; 10]);
        assert!(frame_to_rgb(&frame).is_err());
    }

    #[test]
    fn test_to_nchw_normalization() {
        let img: RgbImage = ImageBuffer::from_pixel(2, 2, Rgb([255, 0, 255]));
        let tensor = to_nchw(&img, ZERO_MEAN, UNIT_STD);
        assert_eq!(tensor.len(), 12);
        // Channel-planar layout: R plane first.
        assert!((tensor[0] - 1.0).abs() < 1e-6);
        assert!((tensor[4]).abs() < 1e-6); // G plane
        assert!((tensor[8] - 1.0).abs() < 1e-6); // B plane
    }

    #[test]
    fn test_letterbox_wide_image_pads_top_and_bottom() {
        let img: RgbImage = ImageBuffer::from_pixel(100, 50, Rgb([255, 255, 255]));
        let (tensor, info) = letterbox_to_tensor(&img, 64, 64, ZERO_MEAN, UNIT_STD).unwrap();
        assert_eq!(tensor.len(), 3 * 64 * 64);
        assert_eq!(info.scaled_width, 64);
        assert_eq!(info.scaled_height, 32);
        assert_eq!(info.pad_left, 0.0);
        assert_eq!(info.pad_top, 16.0);
        assert!((info.scale - 0.64).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_inverse_mapping() {
        let img: RgbImage = ImageBuffer::from_pixel(100, 50, Rgb([0, 0, 0]));
        let (_, info) = letterbox_to_tensor(&img, 64, 64, ZERO_MEAN, UNIT_STD).unwrap();
        // The letterboxed top-left of the content maps back to the origin.
        let (x, y) = info.unmap_point(info.pad_left, info.pad_top);
        assert!(x.abs() < 1e-4);
        assert!(y.abs() < 1e-4);
        // The content's far corner maps back to (100, 50).
        let (x, y) = info.unmap_point(
            info.pad_left + info.scaled_width as f32,
            info.pad_top + info.scaled_height as f32,
        );
        assert!((x - 100.0).abs() < 1e-3);
        assert!((y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_unmap_box_rescales() {
        let info = LetterboxInfo {
            scale: 0.5,
            pad_left: 10.0,
            pad_top: 20.0,
            scaled_width: 0,
            scaled_height: 0,
        };
        let mapped = info.unmap_box(&BoundingBox::new(10.0, 20.0, 5.0, 5.0));
        assert_eq!(mapped.x, 0.0);
        assert_eq!(mapped.y, 0.0);
        assert_eq!(mapped.width, 10.0);
        assert_eq!(mapped.height, 10.0);
    }
}
