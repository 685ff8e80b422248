//! Fixed-capacity ring buffer of recent frames, keyed by frame id.
//!
//! Slot `frame_id % capacity` holds the most recent frame for that
//! residue; `get` only returns a frame whose id matches exactly, so a
//! caller asking for an overwritten frame sees "not found" rather than a
//! wrong frame. The recorder writes, downstream consumers read selected
//! ids to assemble keyframe output.

use std::sync::Mutex;

use fsift_models::{Frame, RingBufferStats};
use tracing::warn;

struct Slot {
    frame: Frame,
}

struct RingState {
    slots: Vec<Option<Slot>>,
    stats: RingBufferStats,
}

/// Thread-safe ring frame buffer.
pub struct RingFrameBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl RingFrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        slots.resize_with(capacity.max(1), || None);
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(RingState {
                slots,
                stats: RingBufferStats::default(),
            }),
        }
    }

    /// Store a frame, overwriting whatever occupied its slot.
    pub fn push(&self, frame: Frame) {
        let index = frame.frame_id as usize % self.capacity;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = &state.slots[index] {
            if existing.frame.frame_id != frame.frame_id {
                state.stats.total_overwritten_frames += 1;
            }
        }

        state.slots[index] = Some(Slot { frame });
        state.stats.total_written_frames += 1;
    }

    /// Fetch a frame by id; `None` when the slot was overwritten or never
    /// written.
    pub fn get(&self, frame_id: u32) -> Option<Frame> {
        let index = frame_id as usize % self.capacity;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let found = match &state.slots[index] {
            Some(slot) if slot.frame.frame_id == frame_id => Some(slot.frame.clone()),
            _ => None,
        };

        if found.is_some() {
            state.stats.total_read_frames += 1;
        } else {
            warn!(frame_id, "Frame not found in ring buffer");
        }

        found
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> RingBufferStats {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> Frame {
        Frame::new(id, id as u64 * 33, 2, 2, 1, vec![id as u8; 4])
    }

    #[test]
    fn test_push_get_round_trip() {
        let ring = RingFrameBuffer::new(4);
        ring.push(frame(7));
        let out = ring.get(7).unwrap();
        assert_eq!(out.frame_id, 7);
        assert_eq!(out.timestamp_ms, 231);
        assert_eq!(out.data, vec![7; 4]);
    }

    #[test]
    fn test_get_missing_is_none() {
        let ring = RingFrameBuffer::new(4);
        assert!(ring.get(3).is_none());
    }

    #[test]
    fn test_collision_overwrites_and_counts() {
        let ring = RingFrameBuffer::new(4);
        ring.push(frame(1));
        ring.push(frame(5)); // 5 % 4 == 1
        assert!(ring.get(1).is_none(), "overwritten frame is gone");
        assert_eq!(ring.get(5).unwrap().frame_id, 5);

        let stats = ring.stats();
        assert_eq!(stats.total_written_frames, 2);
        assert_eq!(stats.total_overwritten_frames, 1);
        assert_eq!(stats.total_read_frames, 1);
    }

    #[test]
    fn test_same_id_rewrite_not_counted_as_overwrite() {
        let ring = RingFrameBuffer::new(4);
        ring.push(frame(2));
        ring.push(frame(2));
        assert_eq!(ring.stats().total_overwritten_frames, 0);
    }

    #[test]
    fn test_wraparound_keeps_latest_window() {
        let ring = RingFrameBuffer::new(3);
        for id in 0..10 {
            ring.push(frame(id));
        }
        // Only the last window of ids survives.
        for id in 0..7 {
            assert!(ring.get(id).is_none());
        }
        for id in 7..10 {
            assert_eq!(ring.get(id).unwrap().frame_id, id);
        }
    }
}
