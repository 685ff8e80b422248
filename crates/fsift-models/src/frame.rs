//! Raw video frames as they travel between capture, bus and analysis.

use serde::{Deserialize, Serialize};

/// A decoded video frame: descriptor plus raw pixel bytes.
///
/// `frame_id` is assigned by the capture side and increases monotonically
/// within one recording session. Pixels are packed row-major HWC
/// (interleaved channels), `channels` is 3 for BGR/RGB and 1 for grayscale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: u32,
    /// Milliseconds since capture start.
    pub timestamp_ms: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame, asserting nothing about the pixel contents.
    pub fn new(
        frame_id: u32,
        timestamp_ms: u64,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            width,
            height,
            channels,
            data,
        }
    }

    /// Expected pixel byte count for the descriptor.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Whether the pixel buffer length matches the descriptor.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len() && (self.channels == 1 || self.channels == 3)
    }

    /// Timestamp in seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }
}
