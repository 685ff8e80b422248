//! IoU-based tracker for maintaining object identity across frames.
//!
//! Two greedy association passes per frame: active tracks first, then the
//! lost list gets a chance to recover before aging out. Track ids come
//! from a monotonic counter and are never reused.

use std::collections::HashMap;

use fsift_models::{BoundingBox, Track};

/// Minimum IoU for associating a detection with a track.
const MIN_MATCH_IOU: f32 = 0.3;
/// EMA factor for velocity updates (weight of the new displacement).
const VELOCITY_ALPHA: f32 = 0.7;

/// One detection fed to the tracker.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: i32,
}

/// Per-update track churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerDelta {
    pub new_tracks: u32,
    pub lost_tracks: u32,
}

/// Greedy IoU tracker with a lost-track recovery buffer.
pub struct IouTracker {
    /// Minimum confidence for an unmatched detection to spawn a track.
    high_threshold: f32,
    /// Missed frames before a lost track is destroyed.
    buffer_size: u32,
    max_tracks: usize,
    active: Vec<Track>,
    lost: Vec<Track>,
    lost_frames: HashMap<i32, u32>,
    next_track_id: i32,
}

impl IouTracker {
    pub fn new(high_threshold: f32, buffer_size: u32, max_tracks: usize) -> Self {
        Self {
            high_threshold,
            buffer_size,
            max_tracks,
            active: Vec::new(),
            lost: Vec::new(),
            lost_frames: HashMap::new(),
            next_track_id: 0,
        }
    }

    /// Associate detections with tracks and update lifecycle state.
    pub fn update(&mut self, detections: &[Detection]) -> TrackerDelta {
        let mut delta = TrackerDelta::default();
        let mut used = vec![false; detections.len()];
        let mut next_active: Vec<Track> = Vec::new();
        let mut freshly_lost: Vec<Track> = Vec::new();

        // Pass 1: match active tracks against detections.
        for mut track in std::mem::take(&mut self.active) {
            match best_match(&track.bbox, detections, &used) {
                Some(index) => {
                    used[index] = true;
                    update_track(&mut track, &detections[index]);
                    self.lost_frames.insert(track.track_id, 0);
                    next_active.push(track);
                }
                None => {
                    delta.lost_tracks += 1;
                    freshly_lost.push(track);
                }
            }
        }

        // Pass 2: give lost tracks a chance to recover.
        for track in std::mem::take(&mut self.lost) {
            match best_match(&track.bbox, detections, &used) {
                Some(index) => {
                    used[index] = true;
                    let mut track = track;
                    update_track(&mut track, &detections[index]);
                    self.lost_frames.insert(track.track_id, 0);
                    next_active.push(track);
                }
                None => {
                    let missed = self.lost_frames.entry(track.track_id).or_insert(0);
                    *missed += 1;
                    if *missed >= self.buffer_size {
                        self.lost_frames.remove(&track.track_id);
                    } else {
                        self.lost.push(track);
                    }
                }
            }
        }

        // Tracks that just went missing start their miss count this frame.
        for track in freshly_lost {
            if self.buffer_size <= 1 {
                self.lost_frames.remove(&track.track_id);
            } else {
                self.lost_frames.insert(track.track_id, 1);
                self.lost.push(track);
            }
        }

        // Pass 3: confident unmatched detections become new tracks.
        for (index, detection) in detections.iter().enumerate() {
            if used[index]
                || detection.confidence <= self.high_threshold
                || next_active.len() >= self.max_tracks
            {
                continue;
            }
            let track = Track::new(
                self.next_track_id,
                detection.bbox,
                detection.confidence,
                detection.class_id,
            );
            self.lost_frames.insert(track.track_id, 0);
            self.next_track_id += 1;
            delta.new_tracks += 1;
            next_active.push(track);
        }

        self.active = next_active;
        delta
    }

    pub fn active_tracks(&self) -> &[Track] {
        &self.active
    }

    /// Mean scalar speed over active tracks, zero when there are none.
    pub fn average_speed(&self) -> f32 {
        if self.active.is_empty() {
            return 0.0;
        }
        let total: f32 = self.active.iter().map(Track::speed).sum();
        total / self.active.len() as f32
    }

    /// Drop all state. Track ids restart from zero.
    pub fn reset(&mut self) {
        self.active.clear();
        self.lost.clear();
        self.lost_frames.clear();
        self.next_track_id = 0;
    }
}

fn best_match(bbox: &BoundingBox, detections: &[Detection], used: &[bool]) -> Option<usize> {
    let mut best_iou = MIN_MATCH_IOU;
    let mut best = None;
    for (index, detection) in detections.iter().enumerate() {
        if used[index] {
            continue;
        }
        let iou = bbox.iou(&detection.bbox);
        if iou > best_iou {
            best_iou = iou;
            best = Some(index);
        }
    }
    best
}

fn update_track(track: &mut Track, detection: &Detection) {
    let (old_cx, old_cy) = track.bbox.center();
    let (new_cx, new_cy) = detection.bbox.center();
    let (dx, dy) = (new_cx - old_cx, new_cy - old_cy);

    if track.just_created {
        // First match after creation: the previous velocity is undefined,
        // take the raw displacement instead of blending with zero.
        track.velocity = (dx, dy);
        track.just_created = false;
    } else {
        track.velocity = (
            VELOCITY_ALPHA * dx + (1.0 - VELOCITY_ALPHA) * track.velocity.0,
            VELOCITY_ALPHA * dy + (1.0 - VELOCITY_ALPHA) * track.velocity.1,
        );
    }

    track.bbox = detection.bbox;
    track.confidence = detection.confidence;
    track.class_id = detection.class_id;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, y, 50.0, 50.0),
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn test_confident_detections_become_tracks() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        let delta = tracker.update(&[det(100.0, 100.0, 0.9), det(300.0, 300.0, 0.8)]);
        assert_eq!(delta.new_tracks, 2);
        assert_eq!(tracker.active_tracks().len(), 2);
        assert_eq!(tracker.active_tracks()[0].track_id, 0);
        assert_eq!(tracker.active_tracks()[1].track_id, 1);
    }

    #[test]
    fn test_low_confidence_does_not_spawn() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        let delta = tracker.update(&[det(100.0, 100.0, 0.5)]);
        assert_eq!(delta.new_tracks, 0);
        assert!(tracker.active_tracks().is_empty());
    }

    #[test]
    fn test_track_identity_persists() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        let id = tracker.active_tracks()[0].track_id;

        let delta = tracker.update(&[det(105.0, 105.0, 0.9)]);
        assert_eq!(delta.new_tracks, 0);
        assert_eq!(tracker.active_tracks()[0].track_id, id);
    }

    #[test]
    fn test_first_match_takes_raw_displacement() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        tracker.update(&[det(110.0, 100.0, 0.9)]);
        // Velocity equals the displacement, not 0.7 * displacement.
        let track = &tracker.active_tracks()[0];
        assert!((track.velocity.0 - 10.0).abs() < 1e-4);
        assert!((track.velocity.1).abs() < 1e-4);

        // The second match blends with the previous velocity.
        tracker.update(&[det(120.0, 100.0, 0.9)]);
        let track = &tracker.active_tracks()[0];
        assert!((track.velocity.0 - 10.0).abs() < 1e-4); // 0.7*10 + 0.3*10
    }

    #[test]
    fn test_lost_track_recovers_with_same_id() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        let id = tracker.active_tracks()[0].track_id;

        let delta = tracker.update(&[]);
        assert_eq!(delta.lost_tracks, 1);
        assert!(tracker.active_tracks().is_empty());

        tracker.update(&[det(102.0, 102.0, 0.9)]);
        assert_eq!(tracker.active_tracks()[0].track_id, id);
    }

    #[test]
    fn test_lost_track_destroyed_after_buffer() {
        let mut tracker = IouTracker::new(0.6, 3, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);

        for _ in 0..3 {
            tracker.update(&[]);
        }
        // Buffer exhausted: a detection at the same spot is a new id.
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        assert_eq!(tracker.active_tracks()[0].track_id, 1);
    }

    #[test]
    fn test_ids_never_reused_after_reset_churn() {
        let mut tracker = IouTracker::new(0.6, 1, 50);
        tracker.update(&[det(0.0, 0.0, 0.9)]);
        tracker.update(&[]); // destroyed immediately with buffer 1
        tracker.update(&[det(500.0, 500.0, 0.9)]);
        assert_eq!(tracker.active_tracks()[0].track_id, 1);
    }

    #[test]
    fn test_max_tracks_cap() {
        let mut tracker = IouTracker::new(0.6, 30, 1);
        let delta = tracker.update(&[det(0.0, 0.0, 0.9), det(300.0, 300.0, 0.9)]);
        assert_eq!(delta.new_tracks, 1);
        assert_eq!(tracker.active_tracks().len(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        tracker.reset();
        tracker.reset();
        assert!(tracker.active_tracks().is_empty());
        assert_eq!(tracker.average_speed(), 0.0);

        // Fresh start after reset reuses ids from zero by design.
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        assert_eq!(tracker.active_tracks()[0].track_id, 0);
    }

    #[test]
    fn test_average_speed() {
        let mut tracker = IouTracker::new(0.6, 30, 50);
        tracker.update(&[det(100.0, 100.0, 0.9)]);
        tracker.update(&[det(103.0, 104.0, 0.9)]);
        assert!((tracker.average_speed() - 5.0).abs() < 1e-4);
    }
}
