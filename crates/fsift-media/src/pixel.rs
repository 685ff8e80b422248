//! Small pixel kernels used by the detectors.
//!
//! Binary morphology, frame differencing, polygon rasterization and
//! external contour tracing over plain byte masks. Masks are row-major,
//! one byte per pixel, zero = background.

use image::{imageops, GrayImage, RgbImage};

/// Downscale, grayscale and Gaussian-blur a frame for differencing.
pub fn downscale_gray_blur(img: &RgbImage, width: u32, height: u32, sigma: f32) -> GrayImage {
    let small = imageops::resize(img, width, height, imageops::FilterType::Triangle);
    let gray = imageops::grayscale(&small);
    imageops::blur(&gray, sigma)
}

/// Absolute difference of two equally sized images, binarized at
/// `threshold` (exclusive): output pixels are 0 or 255.
pub fn absdiff_threshold(a: &GrayImage, b: &GrayImage, threshold: u8) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = GrayImage::new(a.width(), a.height());
    for ((pa, pb), po) in a.pixels().zip(b.pixels()).zip(out.pixels_mut()) {
        let diff = pa[0].abs_diff(pb[0]);
        po[0] = if diff > threshold { 255 } else { 0 };
    }
    out
}

/// 3x3 rectangular erosion of a binary image. Out-of-bounds counts as
/// background, so blobs shrink at the frame edge.
pub fn erode3x3(src: &GrayImage) -> GrayImage {
    morph3x3(src, true)
}

/// 3x3 rectangular dilation of a binary image.
pub fn dilate3x3(src: &GrayImage) -> GrayImage {
    morph3x3(src, false)
}

fn morph3x3(src: &GrayImage, erode: bool) -> GrayImage {
    let (width, height) = src.dimensions();
    let mut out = GrayImage::new(width, height);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut all = true;
            let mut any = false;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    let set = nx >= 0
                        && ny >= 0
                        && nx < width as i64
                        && ny < height as i64
                        && src.get_pixel(nx as u32, ny as u32)[0] != 0;
                    all &= set;
                    any |= set;
                }
            }
            let keep = if erode { all } else { any };
            out.put_pixel(x as u32, y as u32, image::Luma([if keep { 255 } else { 0 }]));
        }
    }
    out
}

/// Count non-background pixels.
pub fn count_nonzero(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p[0] != 0).count()
}

/// Rasterize a polygon into `mask` (even-odd rule, pixel centers).
pub fn fill_polygon(mask: &mut [u8], width: u32, height: u32, polygon: &[(f32, f32)]) {
    if polygon.len() < 3 {
        return;
    }

    for row in 0..height {
        let scan_y = row as f32 + 0.5;
        let mut crossings: Vec<f32> = Vec::new();

        for i in 0..polygon.len() {
            let (x1, y1) = polygon[i];
            let (x2, y2) = polygon[(i + 1) % polygon.len()];
            if (y1 <= scan_y) != (y2 <= scan_y) {
                let t = (scan_y - y1) / (y2 - y1);
                crossings.push(x1 + t * (x2 - x1));
            }
        }

        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks_exact(2) {
            // A column is covered when its center lies inside the span.
            let start = ((pair[0] - 0.5).ceil().max(0.0)) as i64;
            let end = ((pair[1] - 0.5).floor() as i64).min(width as i64 - 1);
            for col in start..=end {
                mask[row as usize * width as usize + col as usize] = 255;
            }
        }
    }
}

/// Trace the external contour of every 8-connected foreground component
/// using Moore-neighbour following. Returns one clockwise point list per
/// component, in scan order of the component's topmost-leftmost pixel.
pub fn find_external_contours(mask: &[u8], width: usize, height: usize) -> Vec<Vec<(i32, i32)>> {
    let mut labels = vec![0u32; width * height];
    let mut contours = Vec::new();
    let mut next_label = 1u32;

    let at = |x: i64, y: i64| -> bool {
        x >= 0
            && y >= 0
            && x < width as i64
            && y < height as i64
            && mask[y as usize * width + x as usize] != 0
    };

    for y in 0..height {
        for x in 0..width {
            if mask[y * width + x] == 0 || labels[y * width + x] != 0 {
                continue;
            }

            // Flood-label the component so later scan hits skip it.
            let label = next_label;
            next_label += 1;
            let mut stack = vec![(x as i64, y as i64)];
            labels[y * width + x] = label;
            while let Some((cx, cy)) = stack.pop() {
                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        let (nx, ny) = (cx + dx, cy + dy);
                        if at(nx, ny) && labels[ny as usize * width + nx as usize] == 0 {
                            labels[ny as usize * width + nx as usize] = label;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            contours.push(trace_contour(&at, (x as i64, y as i64)));
        }
    }

    contours
}

// Clockwise offsets around a pixel, starting west.
const MOORE: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

fn trace_contour(at: &dyn Fn(i64, i64) -> bool, start: (i64, i64)) -> Vec<(i32, i32)> {
    let mut contour = vec![(start.0 as i32, start.1 as i32)];
    // The start pixel is the first in scan order, so its west neighbour is
    // background: begin the clockwise walk there.
    let mut current = start;
    let mut search_from = 0usize;
    let mut first_move: Option<(usize, (i64, i64))> = None;

    loop {
        let mut advanced = false;
        for step in 0..MOORE.len() {
            let dir = (search_from + step) % MOORE.len();
            let (dx, dy) = MOORE[dir];
            let candidate = (current.0 + dx, current.1 + dy);
            if !at(candidate.0, candidate.1) {
                continue;
            }

            // Jacob's stopping criterion: back at the start making the
            // same first move again.
            match first_move {
                None => first_move = Some((dir, candidate)),
                Some(first) => {
                    if current == start && first == (dir, candidate) {
                        contour.pop(); // drop the duplicated start point
                        return contour;
                    }
                }
            }

            current = candidate;
            contour.push((current.0 as i32, current.1 as i32));
            // Resume scanning from the neighbour behind the move direction.
            search_from = (dir + 6) % MOORE.len();
            advanced = true;
            break;
        }

        if !advanced {
            return contour; // isolated pixel
        }
    }
}

/// Polygon area via the shoelace formula.
pub fn contour_area(points: &[(i32, i32)]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled = 0i64;
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        doubled += x1 as i64 * y2 as i64 - x2 as i64 * y1 as i64;
    }
    doubled.abs() as f32 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn binary_image(width: u32, height: u32, set: &[(u32, u32)]) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for &(x, y) in set {
            img.put_pixel(x, y, Luma([255]));
        }
        img
    }

    #[test]
    fn test_absdiff_threshold() {
        let a = binary_image(2, 1, &[(0, 0)]);
        let b = binary_image(2, 1, &[]);
        let diff = absdiff_threshold(&a, &b, 25);
        assert_eq!(diff.get_pixel(0, 0)[0], 255);
        assert_eq!(diff.get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_erode_removes_isolated_pixel() {
        let img = binary_image(5, 5, &[(2, 2)]);
        assert_eq!(count_nonzero(&erode3x3(&img)), 0);
    }

    #[test]
    fn test_erode_keeps_center_of_block() {
        let mut img = GrayImage::new(5, 5);
        for y in 1..4 {
            for x in 1..4 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let eroded = erode3x3(&img);
        assert_eq!(count_nonzero(&eroded), 1);
        assert_eq!(eroded.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_dilate_grows_pixel_to_block() {
        let img = binary_image(5, 5, &[(2, 2)]);
        assert_eq!(count_nonzero(&dilate3x3(&img)), 9);
    }

    #[test]
    fn test_fill_polygon_square() {
        let mut mask = vec![0u8; 100];
        fill_polygon(
            &mut mask,
            10,
            10,
            &[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)],
        );
        let filled = mask.iter().filter(|&&v| v != 0).count();
        assert_eq!(filled, 36); // pixel centers strictly inside 2..8
    }

    #[test]
    fn test_fill_polygon_degenerate() {
        let mut mask = vec![0u8; 100];
        fill_polygon(&mut mask, 10, 10, &[(1.0, 1.0), (5.0, 5.0)]);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_contours_single_block() {
        let mut mask = vec![0u8; 100];
        for y in 2..7usize {
            for x in 3..8usize {
                mask[y * 10 + x] = 255;
            }
        }
        let contours = find_external_contours(&mask, 10, 10);
        assert_eq!(contours.len(), 1);
        // Traced boundary of a 5x5 block covers its outline; shoelace area
        // is (w-1)*(h-1).
        assert!((contour_area(&contours[0]) - 16.0).abs() < 1e-3);
    }

    #[test]
    fn test_contours_two_components() {
        let mut mask = vec![0u8; 100];
        mask[1 * 10 + 1] = 255;
        for y in 5..9usize {
            for x in 5..9usize {
                mask[y * 10 + x] = 255;
            }
        }
        let contours = find_external_contours(&mask, 10, 10);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0], vec![(1, 1)]);
    }

    #[test]
    fn test_contour_area_triangle() {
        let triangle = [(0, 0), (4, 0), (0, 4)];
        assert!((contour_area(&triangle) - 8.0).abs() < 1e-6);
    }
}
