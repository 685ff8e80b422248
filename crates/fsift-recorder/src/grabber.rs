//! Frame capture: the external grabber seam and the paced capture thread.
//!
//! Actual screen capture lives outside this crate; anything that can
//! produce pixel buffers implements [`FrameGrabber`]. The capture thread
//! paces the grabber at the target frame rate, assigns monotonically
//! increasing frame ids and capture-relative timestamps, and pushes into
//! the bounded frame queue, dropping (and counting) when it is full.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use fsift_models::{Frame, RecorderStats};
use fsift_queue::BoundedQueue;
use tracing::{info, warn};

use crate::error::RecorderResult;

const CAPTURE_TIMEOUT: Duration = Duration::from_millis(100);
const QUEUE_PUSH_TIMEOUT: Duration = Duration::from_millis(100);
/// Capture instants kept for the rolling FPS estimate.
const FPS_SAMPLE_SIZE: usize = 30;

/// Pixels straight off a capture device, before ids and timestamps.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

/// The external capture seam.
pub trait FrameGrabber: Send {
    fn start(&mut self) -> RecorderResult<()>;

    fn stop(&mut self);

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    /// Grab one frame, waiting up to `timeout`. `None` means nothing was
    /// available in time.
    fn capture_frame(&mut self, timeout: Duration) -> RecorderResult<Option<CapturedFrame>>;
}

/// Deterministic test/demo grabber producing a moving gradient.
pub struct SyntheticGrabber {
    width: u32,
    height: u32,
    counter: u32,
}

impl SyntheticGrabber {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counter: 0,
        }
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn start(&mut self) -> RecorderResult<()> {
        self.counter = 0;
        Ok(())
    }

    fn stop(&mut self) {}

    fn capture_frame(&mut self, _timeout: Duration) -> RecorderResult<Option<CapturedFrame>> {
        let shift = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push((shift % 256) as u8);
            }
        }
        Ok(Some(CapturedFrame {
            width: self.width,
            height: self.height,
            channels: 3,
            data,
        }))
    }
}

struct CaptureShared {
    running: AtomicBool,
    paused: Mutex<bool>,
    pause_cv: Condvar,
    captured_frames: AtomicI64,
    dropped_frames: AtomicI64,
    fps_samples: Mutex<VecDeque<Instant>>,
}

/// Owns the capture loop thread.
pub struct CaptureThread {
    shared: Arc<CaptureShared>,
    handle: Option<JoinHandle<()>>,
    target_fps: u32,
}

impl CaptureThread {
    pub fn new(target_fps: u32) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                running: AtomicBool::new(false),
                paused: Mutex::new(false),
                pause_cv: Condvar::new(),
                captured_frames: AtomicI64::new(0),
                dropped_frames: AtomicI64::new(0),
                fps_samples: Mutex::new(VecDeque::new()),
            }),
            handle: None,
            target_fps: target_fps.max(1),
        }
    }

    /// Start the grabber and the paced loop feeding `queue`.
    pub fn start(
        &mut self,
        mut grabber: Box<dyn FrameGrabber>,
        queue: Arc<BoundedQueue<Frame>>,
    ) -> RecorderResult<()> {
        grabber.start()?;

        self.shared.captured_frames.store(0, Ordering::SeqCst);
        self.shared.dropped_frames.store(0, Ordering::SeqCst);
        self.shared
            .fps_samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let target_fps = self.target_fps;
        self.handle = Some(std::thread::spawn(move || {
            capture_loop(shared, &mut grabber, &queue, target_fps);
            grabber.stop();
        }));

        info!(target_fps, "Capture thread started");
        Ok(())
    }

    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.pause_cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        info!("Capture thread stopped");
    }

    pub fn pause(&mut self) {
        *self.shared.paused.lock().unwrap_or_else(|e| e.into_inner()) = true;
        info!("Capture paused");
    }

    pub fn resume(&mut self) {
        *self.shared.paused.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.shared.pause_cv.notify_all();
        info!("Capture resumed");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            captured_frames: self.shared.captured_frames.load(Ordering::SeqCst),
            dropped_frames: self.shared.dropped_frames.load(Ordering::SeqCst),
            current_fps: self.current_fps(),
        }
    }

    fn current_fps(&self) -> f64 {
        let samples = self
            .shared
            .fps_samples
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if samples.len() < 2 {
            return 0.0;
        }
        let span = samples
            .back()
            .unwrap()
            .duration_since(*samples.front().unwrap())
            .as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (samples.len() - 1) as f64 / span
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Capture thread dropped while running, stopping");
            self.stop();
        }
    }
}

fn capture_loop(
    shared: Arc<CaptureShared>,
    grabber: &mut Box<dyn FrameGrabber>,
    queue: &BoundedQueue<Frame>,
    target_fps: u32,
) {
    let start_time = Instant::now();
    let frame_duration = Duration::from_millis(1000 / target_fps as u64);
    let mut last_frame_time = start_time;

    info!("Capture loop started");

    while shared.running.load(Ordering::SeqCst) {
        // Pause parking: wait until resumed or stopped.
        {
            let mut paused = shared.paused.lock().unwrap_or_else(|e| e.into_inner());
            while *paused && shared.running.load(Ordering::SeqCst) {
                let (guard, _) = shared
                    .pause_cv
                    .wait_timeout(paused, CAPTURE_TIMEOUT)
                    .unwrap_or_else(|e| e.into_inner());
                paused = guard;
            }
            if !shared.running.load(Ordering::SeqCst) {
                break;
            }
        }

        let captured = match grabber.capture_frame(CAPTURE_TIMEOUT) {
            Ok(Some(captured)) => captured,
            Ok(None) => continue,
            Err(error) => {
                warn!(%error, "Frame capture failed");
                continue;
            }
        };

        let frame_id = shared.captured_frames.load(Ordering::SeqCst) as u32 + 1;
        let frame = Frame::new(
            frame_id,
            start_time.elapsed().as_millis() as u64,
            captured.width,
            captured.height,
            captured.channels,
            captured.data,
        );

        if queue.push_timeout(frame, QUEUE_PUSH_TIMEOUT) {
            shared.captured_frames.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("fsift_recorder_frames_captured").increment(1);

            let mut samples = shared.fps_samples.lock().unwrap_or_else(|e| e.into_inner());
            samples.push_back(Instant::now());
            if samples.len() > FPS_SAMPLE_SIZE {
                samples.pop_front();
            }
        } else {
            shared.dropped_frames.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("fsift_recorder_frames_dropped").increment(1);
            warn!(frame_id, "Frame dropped: queue full");
        }

        // Pace to the target frame rate.
        let elapsed = last_frame_time.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
        last_frame_time = Instant::now();
    }

    info!("Capture loop ended");
}
