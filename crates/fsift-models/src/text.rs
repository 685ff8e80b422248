//! Text regions produced by the text detector.

use serde::{Deserialize, Serialize};

use crate::rect::BoundingBox;

/// A detected on-screen text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    /// Contour polygon in original-frame pixel coordinates.
    pub polygon: Vec<(f32, f32)>,
    /// Axis-aligned bounding rectangle of the polygon.
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    /// Recognized text, empty when recognition is disabled.
    pub text: String,
}

impl TextRegion {
    /// Build a region from a polygon, deriving the bounding rectangle.
    pub fn from_polygon(polygon: Vec<(f32, f32)>) -> Self {
        let bounding_box = bounding_rect(&polygon);
        Self {
            polygon,
            bounding_box,
            confidence: 1.0,
            text: String::new(),
        }
    }
}

/// Axis-aligned bounding rectangle of a point set.
pub fn bounding_rect(points: &[(f32, f32)]) -> BoundingBox {
    if points.is_empty() {
        return BoundingBox::default();
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_rect() {
        let poly = vec![(1.0, 2.0), (5.0, 2.0), (5.0, 8.0), (1.0, 8.0)];
        let rect = bounding_rect(&poly);
        assert_eq!(rect.x, 1.0);
        assert_eq!(rect.y, 2.0);
        assert_eq!(rect.width, 4.0);
        assert_eq!(rect.height, 6.0);
    }

    #[test]
    fn test_from_polygon_sets_rect() {
        let region = TextRegion::from_polygon(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 4.0)]);
        assert_eq!(region.bounding_box.width, 10.0);
        assert_eq!(region.bounding_box.height, 4.0);
        assert!(region.text.is_empty());
    }

    #[test]
    fn test_empty_polygon() {
        let rect = bounding_rect(&[]);
        assert_eq!(rect.area(), 0.0);
    }
}
