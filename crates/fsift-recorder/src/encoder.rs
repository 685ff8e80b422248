//! The opaque video encoder seam.
//!
//! MP4 muxing/encoding is an external concern; the recorder only needs
//! somewhere to hand frames. `NullEncoder` satisfies deployments that
//! only use the message bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fsift_models::Frame;
use tracing::info;

use crate::error::RecorderResult;

/// Receives frames in display order and produces a video file (or not).
pub trait VideoEncoderSink: Send {
    fn open(&mut self, width: u32, height: u32, fps: u32) -> RecorderResult<()>;

    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()>;

    fn finish(&mut self) -> RecorderResult<()>;
}

/// Discards frames, counting them.
#[derive(Default)]
pub struct NullEncoder {
    frames_written: Arc<AtomicU64>,
}

impl NullEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter, readable after the encoder moved into the service.
    pub fn frames_written_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_written)
    }
}

impl VideoEncoderSink for NullEncoder {
    fn open(&mut self, width: u32, height: u32, fps: u32) -> RecorderResult<()> {
        info!(width, height, fps, "Null encoder opened");
        Ok(())
    }

    fn write_frame(&mut self, _frame: &Frame) -> RecorderResult<()> {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        info!(
            frames = self.frames_written.load(Ordering::Relaxed),
            "Null encoder finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_encoder_counts() {
        let mut encoder = NullEncoder::new();
        let counter = encoder.frames_written_handle();
        encoder.open(4, 4, 30).unwrap();
        let frame = Frame::new(1, 0, 4, 4, 3, vec![0; 48]);
        encoder.write_frame(&frame).unwrap();
        encoder.write_frame(&frame).unwrap();
        encoder.finish().unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }
}
