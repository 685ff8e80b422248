//! The recorder pipeline: capture → encode + ring buffer + publish.
//!
//! Two threads: the paced capture loop (see [`crate::grabber`]) feeding a
//! bounded queue, and a process loop that drains it into the encoder,
//! the ring buffer and the frame bus.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use fsift_models::{Frame, RecorderConfig, RecorderStats};
use fsift_proto::wire::serialize_frame;
use fsift_proto::MessageSink;
use fsift_queue::BoundedQueue;
use tracing::{info, warn};

use crate::encoder::VideoEncoderSink;
use crate::error::RecorderResult;
use crate::grabber::{CaptureThread, FrameGrabber};
use crate::ring::RingFrameBuffer;

const STAGE_TIMEOUT: Duration = Duration::from_millis(100);

/// One recording session: capture, encode, buffer, publish.
pub struct RecorderService {
    config: RecorderConfig,
    ring: Arc<RingFrameBuffer>,
    frame_queue: Arc<BoundedQueue<Frame>>,
    capture: Mutex<CaptureThread>,
    process_thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    publish_errors: Arc<AtomicU64>,
    grabber: Mutex<Option<Box<dyn FrameGrabber>>>,
    encoder: Mutex<Option<Box<dyn VideoEncoderSink>>>,
    frame_sink: Mutex<Option<Box<dyn MessageSink>>>,
}

impl RecorderService {
    pub fn new(
        config: RecorderConfig,
        grabber: Box<dyn FrameGrabber>,
        encoder: Box<dyn VideoEncoderSink>,
        frame_sink: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            ring: Arc::new(RingFrameBuffer::new(config.ring_capacity)),
            frame_queue: Arc::new(BoundedQueue::new(config.frame_queue_size)),
            capture: Mutex::new(CaptureThread::new(config.target_fps)),
            process_thread: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            publish_errors: Arc::new(AtomicU64::new(0)),
            grabber: Mutex::new(Some(grabber)),
            encoder: Mutex::new(Some(encoder)),
            frame_sink: Mutex::new(Some(frame_sink)),
            config,
        }
    }

    /// Open the encoder and spawn both loops.
    pub fn start(&self) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(crate::error::RecorderError::AlreadyRunning);
        }

        let grabber = self
            .grabber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                self.running.store(false, Ordering::SeqCst);
                crate::error::RecorderError::NotInitialized
            })?;
        let mut encoder = self
            .encoder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(crate::error::RecorderError::NotInitialized)?;
        let sink = self
            .frame_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(crate::error::RecorderError::NotInitialized)?;

        if let Err(error) = encoder.open(
            self.config.capture_width,
            self.config.capture_height,
            self.config.target_fps,
        ) {
            self.running.store(false, Ordering::SeqCst);
            return Err(error);
        }

        self.frame_queue.reset();
        self.capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .start(grabber, Arc::clone(&self.frame_queue))?;

        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.frame_queue);
        let ring = Arc::clone(&self.ring);
        let publish_errors = Arc::clone(&self.publish_errors);
        *self.process_thread.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(std::thread::spawn(move || {
                process_loop(running, queue, ring, encoder, sink, publish_errors);
            }));

        info!("Recorder service started");
        Ok(())
    }

    /// Stop capture first, then drain and close the processing side.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.capture.lock().unwrap_or_else(|e| e.into_inner()).stop();
        self.frame_queue.stop();
        if let Some(handle) = self
            .process_thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = handle.join();
        }
        info!("Recorder service stopped");
    }

    pub fn pause(&self) {
        self.capture.lock().unwrap_or_else(|e| e.into_inner()).pause();
    }

    pub fn resume(&self) {
        self.capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resume();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.capture
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_paused()
    }

    pub fn stats(&self) -> RecorderStats {
        self.capture.lock().unwrap_or_else(|e| e.into_inner()).stats()
    }

    pub fn publish_error_count(&self) -> u64 {
        self.publish_errors.load(Ordering::Relaxed)
    }

    /// Shared ring buffer, for keyframe-video assembly.
    pub fn ring(&self) -> Arc<RingFrameBuffer> {
        Arc::clone(&self.ring)
    }
}

impl Drop for RecorderService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_loop(
    running: Arc<AtomicBool>,
    queue: Arc<BoundedQueue<Frame>>,
    ring: Arc<RingFrameBuffer>,
    mut encoder: Box<dyn VideoEncoderSink>,
    mut sink: Box<dyn MessageSink>,
    publish_errors: Arc<AtomicU64>,
) {
    info!("Process loop started");

    while running.load(Ordering::SeqCst) || !queue.is_empty() {
        let Some(frame) = queue.pop_timeout(STAGE_TIMEOUT) else {
            continue;
        };

        if let Err(error) = encoder.write_frame(&frame) {
            warn!(frame_id = frame.frame_id, %error, "Encoder rejected frame");
        }

        let payload = serialize_frame(&frame);
        ring.push(frame);

        if let Err(error) = sink.send(&payload) {
            publish_errors.fetch_add(1, Ordering::Relaxed);
            warn!(%error, "Failed to publish frame");
        } else {
            metrics::counter!("fsift_recorder_frames_published").increment(1);
        }
    }

    if let Err(error) = encoder.finish() {
        warn!(%error, "Encoder finish failed");
    }
    sink.close();
    info!("Process loop stopped");
}
