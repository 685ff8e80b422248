//! Motion tracks maintained across frames by the motion detector.

use serde::{Deserialize, Serialize};

use crate::rect::BoundingBox;

/// A tracked moving object.
///
/// Track ids are assigned from a monotonic counter and never reused.
/// Velocity is an exponential moving average of the center displacement
/// between consecutive matches; a freshly created track has zero velocity
/// until its second match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: i32,
    pub bbox: BoundingBox,
    /// Smoothed center displacement per frame (dx, dy).
    pub velocity: (f32, f32),
    pub confidence: f32,
    pub class_id: i32,
    /// True until the first post-creation match updates the velocity.
    pub just_created: bool,
}

impl Track {
    /// Create a new track from an initial detection.
    pub fn new(track_id: i32, bbox: BoundingBox, confidence: f32, class_id: i32) -> Self {
        Self {
            track_id,
            bbox,
            velocity: (0.0, 0.0),
            confidence,
            class_id,
            just_created: true,
        }
    }

    /// Scalar speed in pixels per frame.
    pub fn speed(&self) -> f32 {
        let (vx, vy) = self.velocity;
        (vx * vx + vy * vy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_has_zero_velocity() {
        let track = Track::new(1, BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9, 0);
        assert_eq!(track.velocity, (0.0, 0.0));
        assert!(track.just_created);
        assert_eq!(track.speed(), 0.0);
    }

    #[test]
    fn test_speed() {
        let mut track = Track::new(1, BoundingBox::default(), 0.9, 0);
        track.velocity = (3.0, 4.0);
        assert!((track.speed() - 5.0).abs() < 1e-6);
    }
}
