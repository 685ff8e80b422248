//! Keyframe video assembly.
//!
//! Consumes keyframe metadata from the bus, looks the frames up in the
//! ring buffer by id and forwards exact hits to an encoder sink. A frame
//! that was already overwritten is counted and skipped, never fatal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use fsift_proto::wire::deserialize_metadata;
use fsift_proto::{MessageSource, ProtoError};
use tracing::{info, warn};

use crate::encoder::VideoEncoderSink;
use crate::error::RecorderResult;
use crate::ring::RingFrameBuffer;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Builds a keyframes-only video from metadata + ring buffer.
pub struct KeyframeVideoBuilder {
    ring: Arc<RingFrameBuffer>,
    running: Arc<AtomicBool>,
    written: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl KeyframeVideoBuilder {
    pub fn new(ring: Arc<RingFrameBuffer>) -> Self {
        Self {
            ring,
            running: Arc::new(AtomicBool::new(false)),
            written: Arc::new(AtomicU64::new(0)),
            missed: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        }
    }

    /// Start consuming metadata into the encoder.
    pub fn start(
        &self,
        mut source: Box<dyn MessageSource>,
        mut encoder: Box<dyn VideoEncoderSink>,
        width: u32,
        height: u32,
        fps: u32,
    ) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(crate::error::RecorderError::AlreadyRunning);
        }
        encoder.open(width, height, fps)?;

        let ring = Arc::clone(&self.ring);
        let running = Arc::clone(&self.running);
        let written = Arc::clone(&self.written);
        let missed = Arc::clone(&self.missed);

        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(std::thread::spawn(move || {
                info!("Keyframe builder started");
                while running.load(Ordering::SeqCst) {
                    let bytes = match source.recv_timeout(RECV_TIMEOUT) {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => continue,
                        Err(ProtoError::Closed) => break,
                        Err(error) => {
                            warn!(%error, "Metadata source failed");
                            break;
                        }
                    };

                    let meta = match deserialize_metadata(&bytes) {
                        Ok(meta) => meta,
                        Err(error) => {
                            warn!(%error, "Dropping undecodable metadata message");
                            continue;
                        }
                    };

                    match ring.get(meta.frame_id) {
                        Some(frame) => {
                            if let Err(error) = encoder.write_frame(&frame) {
                                warn!(frame_id = meta.frame_id, %error, "Encoder rejected keyframe");
                            } else {
                                written.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        None => {
                            // Overwritten before selection caught up.
                            missed.fetch_add(1, Ordering::Relaxed);
                            warn!(frame_id = meta.frame_id, "Keyframe no longer in ring buffer");
                        }
                    }
                }
                if let Err(error) = encoder.finish() {
                    warn!(%error, "Keyframe encoder finish failed");
                }
                info!("Keyframe builder stopped");
            }));
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    pub fn written_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn missed_count(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }
}

impl Drop for KeyframeVideoBuilder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::NullEncoder;
    use fsift_models::Frame;
    use fsift_proto::wire::{serialize_metadata, KeyframeMetadata};
    use fsift_proto::{loopback, MessageSink};
    use std::time::Instant;

    fn meta(frame_id: u32) -> KeyframeMetadata {
        KeyframeMetadata {
            frame_id,
            timestamp_ms: frame_id as u64 * 33,
            final_score: 0.9,
            scene_score: 0.4,
            motion_score: 0.3,
            text_score: 0.2,
            is_scene_change: false,
        }
    }

    fn frame(id: u32) -> Frame {
        Frame::new(id, id as u64 * 33, 4, 4, 3, vec![id as u8; 48])
    }

    #[test]
    fn test_builder_writes_hits_and_counts_misses() {
        let ring = Arc::new(RingFrameBuffer::new(8));
        ring.push(frame(1));
        ring.push(frame(2));

        let (mut meta_tx, meta_rx) = loopback(32);
        let encoder = NullEncoder::new();
        let encoded = encoder.frames_written_handle();

        let builder = KeyframeVideoBuilder::new(Arc::clone(&ring));
        builder
            .start(Box::new(meta_rx), Box::new(encoder), 4, 4, 30)
            .unwrap();

        meta_tx.send(&serialize_metadata(&meta(1))).unwrap();
        meta_tx.send(&serialize_metadata(&meta(2))).unwrap();
        meta_tx.send(&serialize_metadata(&meta(99))).unwrap(); // never captured
        meta_tx.close();

        let deadline = Instant::now() + Duration::from_secs(5);
        while builder.written_count() + builder.missed_count() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        builder.stop();

        assert_eq!(builder.written_count(), 2);
        assert_eq!(builder.missed_count(), 1);
        assert_eq!(encoded.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn test_builder_survives_garbage_metadata() {
        let ring = Arc::new(RingFrameBuffer::new(8));
        ring.push(frame(5));

        let (mut meta_tx, meta_rx) = loopback(32);
        let builder = KeyframeVideoBuilder::new(Arc::clone(&ring));
        builder
            .start(Box::new(meta_rx), Box::new(NullEncoder::new()), 4, 4, 30)
            .unwrap();

        meta_tx.send(b"not metadata").unwrap();
        meta_tx.send(&serialize_metadata(&meta(5))).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while builder.written_count() < 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        builder.stop();
        assert_eq!(builder.written_count(), 1);
    }
}
