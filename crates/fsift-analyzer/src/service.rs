//! The four-stage analysis pipeline.
//!
//! ```text
//! MessageSource → receive ─► frame queue ─► N analysis workers
//!                                                │ FrameScore
//!                                                ▼
//!                                           score queue
//!                                                │
//!                                                ▼
//!                                         selector (window 30)
//!                                                │
//!                                                ▼
//!                                          selected queue
//!                                                │
//!                                                ▼
//!                                     publish → MessageSink
//! ```
//!
//! Stages run on OS threads and meet only at bounded queues. Shutdown
//! cascades source-first so every stage drains before its output stops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use fsift_media::{
    DynamicWeightCalculator, FrameResource, FrameScorer, KeyframeSelector, ModelRegistry,
    MotionDetector, SceneChangeDetector, StandardFrameAnalyzer, TextDetector,
};
use fsift_models::{
    AnalysisContext, AnalyzerConfig, AnalyzerStats, FrameScore, KeyframeSummary,
};
use fsift_proto::wire::{deserialize_frame, serialize_metadata, KeyframeMetadata};
use fsift_proto::{MessageSink, MessageSource, ProtoError};
use fsift_queue::BoundedQueue;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Scores accumulated before each selection pass.
const WINDOW_SIZE: usize = 30;
/// Queue push/pop timeout; keeps stopped-but-empty stages responsive.
const STAGE_TIMEOUT: Duration = Duration::from_millis(100);

struct ContextState {
    context: AnalysisContext,
    scored_frames: u64,
}

struct StatsState {
    latest_keyframes: Vec<KeyframeSummary>,
    total_keyframes: i64,
}

struct ServiceInner {
    config: AnalyzerConfig,
    running: AtomicBool,
    failed: AtomicBool,
    analyzer: StandardFrameAnalyzer,
    scorer: FrameScorer,
    selector: KeyframeSelector,
    frame_queue: BoundedQueue<(FrameResource, AnalysisContext)>,
    score_queue: BoundedQueue<FrameScore>,
    selected_queue: BoundedQueue<FrameScore>,
    context: Mutex<ContextState>,
    stats: Mutex<StatsState>,
    input_errors: AtomicU64,
    dropped_frames: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Default)]
struct ThreadHandles {
    receive: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    select: Option<JoinHandle<()>>,
    publish: Option<JoinHandle<()>>,
}

/// The analyzer pipeline service. One service instance runs one
/// start/stop cycle over one source/sink pair.
pub struct AnalyzerService {
    inner: Arc<ServiceInner>,
    source: Mutex<Option<Box<dyn MessageSource>>>,
    sink: Mutex<Option<Box<dyn MessageSink>>>,
    threads: Mutex<ThreadHandles>,
}

impl AnalyzerService {
    /// Assemble detectors, scorer and selector from a validated config.
    pub fn new(
        config: AnalyzerConfig,
        registry: Arc<ModelRegistry>,
        source: Box<dyn MessageSource>,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        let scene = SceneChangeDetector::new(Arc::clone(&registry), config.scene_detector.clone());
        let motion = MotionDetector::new(Arc::clone(&registry), config.motion_detector.clone());

        // The global recognition switch overrides the group flag.
        let mut text_config = config.text_detector.clone();
        text_config.enable_recognition = config.enable_text_recognition;
        let text = TextDetector::new(Arc::clone(&registry), text_config);

        let analyzer = StandardFrameAnalyzer::new(
            Some(Arc::new(scene)),
            Some(Arc::new(motion)),
            Some(Arc::new(text)),
        );
        let scorer = FrameScorer::new(
            DynamicWeightCalculator::new(config.dynamic_calculator.clone()),
            config.frame_scorer.clone(),
        );
        let selector = KeyframeSelector::new(config.keyframe_detector.clone());

        let inner = Arc::new(ServiceInner {
            running: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            analyzer,
            scorer,
            selector,
            frame_queue: BoundedQueue::new(config.pipeline.frame_buffer_size),
            score_queue: BoundedQueue::new(config.pipeline.score_buffer_size),
            selected_queue: BoundedQueue::new(config.pipeline.score_buffer_size),
            context: Mutex::new(ContextState {
                context: AnalysisContext::default(),
                scored_frames: 0,
            }),
            stats: Mutex::new(StatsState {
                latest_keyframes: Vec::new(),
                total_keyframes: 0,
            }),
            input_errors: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            last_error: Mutex::new(None),
            config,
        });

        Self {
            inner,
            source: Mutex::new(Some(source)),
            sink: Mutex::new(Some(sink)),
            threads: Mutex::new(ThreadHandles::default()),
        }
    }

    /// Spawn the pipeline threads.
    pub fn start(&self) -> PipelineResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyRunning);
        }

        let source = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                self.inner.running.store(false, Ordering::SeqCst);
                PipelineError::InitFailed("transport already consumed by a previous run".into())
            })?;
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                self.inner.running.store(false, Ordering::SeqCst);
                PipelineError::InitFailed("transport already consumed by a previous run".into())
            })?;

        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());

        let inner = Arc::clone(&self.inner);
        threads.receive = Some(std::thread::spawn(move || receive_loop(inner, source)));

        for worker in 0..self.inner.config.pipeline.analysis_thread_count {
            let inner = Arc::clone(&self.inner);
            threads
                .workers
                .push(std::thread::spawn(move || analysis_loop(inner, worker)));
        }

        let inner = Arc::clone(&self.inner);
        threads.select = Some(std::thread::spawn(move || select_loop(inner)));

        let inner = Arc::clone(&self.inner);
        threads.publish = Some(std::thread::spawn(move || publish_loop(inner, sink)));

        info!(
            workers = self.inner.config.pipeline.analysis_thread_count,
            "Analyzer service started"
        );
        Ok(())
    }

    /// Stop the pipeline: each stage drains before its output stops.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = threads.receive.take() {
            let _ = handle.join();
        }

        self.inner.frame_queue.stop();
        for handle in threads.workers.drain(..) {
            let _ = handle.join();
        }

        self.inner.score_queue.stop();
        if let Some(handle) = threads.select.take() {
            let _ = handle.join();
        }

        self.inner.selected_queue.stop();
        if let Some(handle) = threads.publish.take() {
            let _ = handle.join();
        }

        info!("Analyzer service stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether a fatal error took the pipeline down.
    pub fn has_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> AnalysisContext {
        self.inner
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .context
    }

    pub fn stats(&self) -> AnalyzerStats {
        let context = self.context();
        let stats = self.inner.stats.lock().unwrap_or_else(|e| e.into_inner());
        AnalyzerStats {
            analyzed_frame_count: context.total_frames_analyzed as i64,
            keyframe_count: stats.total_keyframes,
            latest_keyframes: stats.latest_keyframes.clone(),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn input_error_count(&self) -> u64 {
        self.inner.input_errors.load(Ordering::Relaxed)
    }

    pub fn dropped_frame_count(&self) -> u64 {
        self.inner.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.inner.config
    }
}

impl Drop for AnalyzerService {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn receive_loop(inner: Arc<ServiceInner>, mut source: Box<dyn MessageSource>) {
    info!("Receive loop started");
    let timeout = Duration::from_millis(inner.config.transport.timeout_ms.max(1));

    while inner.running.load(Ordering::SeqCst) {
        let bytes = match source.recv_timeout(timeout) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(ProtoError::Closed) => {
                info!("Frame source closed");
                break;
            }
            Err(error) => {
                error!(%error, "Frame source failed");
                *inner.last_error.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some(error.to_string());
                inner.failed.store(true, Ordering::SeqCst);
                break;
            }
        };

        let frame = match deserialize_frame(&bytes) {
            Ok(frame) => frame,
            Err(error) => {
                inner.input_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("fsift_analyzer_input_errors").increment(1);
                warn!(%error, "Dropping undecodable frame message");
                continue;
            }
        };
        if !frame.is_well_formed() {
            inner.input_errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("fsift_analyzer_input_errors").increment(1);
            warn!(
                frame_id = frame.frame_id,
                channels = frame.channels,
                "Dropping malformed frame"
            );
            continue;
        }

        let context = {
            let mut state = inner.context.lock().unwrap_or_else(|e| e.into_inner());
            state.context.frame_index = frame.frame_id;
            state.context.timestamp = frame.timestamp_secs();
            state.context.frame_width = frame.width;
            state.context.frame_height = frame.height;
            state.context.total_frames_analyzed += 1;
            state.context
        };
        metrics::counter!("fsift_analyzer_frames_received").increment(1);

        let frame_id = frame.frame_id;
        let resource = FrameResource::new(frame);
        if !inner
            .frame_queue
            .push_timeout((resource, context), STAGE_TIMEOUT)
        {
            inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("fsift_analyzer_frames_dropped").increment(1);
            warn!(frame_id, "Frame queue full, dropping frame");
        }
    }

    info!("Receive loop stopped");
}

fn analysis_loop(inner: Arc<ServiceInner>, worker: u32) {
    debug!(worker, "Analysis loop started");

    while inner.running.load(Ordering::SeqCst) || !inner.frame_queue.is_empty() {
        let Some((resource, context)) = inner.frame_queue.pop_timeout(STAGE_TIMEOUT) else {
            continue;
        };

        let scores = inner.analyzer.analyze(&resource, &context);
        let frame_score = inner.scorer.score(&scores, &context);

        {
            let mut state = inner.context.lock().unwrap_or_else(|e| e.into_inner());
            let scored = state.scored_frames;
            state.context.record_score(frame_score.final_score, scored);
            state.scored_frames += 1;
        }

        let frame_index = frame_score.frame_index;
        if !inner.score_queue.push_timeout(frame_score, STAGE_TIMEOUT) {
            warn!(frame_index, "Score queue full, dropping score");
        }
    }

    debug!(worker, "Analysis loop stopped");
}

fn select_loop(inner: Arc<ServiceInner>) {
    info!("Select loop started");
    let mut buffer: Vec<FrameScore> = Vec::with_capacity(WINDOW_SIZE);

    while inner.running.load(Ordering::SeqCst) || !inner.score_queue.is_empty() {
        let Some(score) = inner.score_queue.pop_timeout(STAGE_TIMEOUT) else {
            continue;
        };
        buffer.push(score);
        if buffer.len() >= WINDOW_SIZE {
            flush_selection(&inner, &mut buffer);
        }
    }

    // Whatever is left at shutdown goes through the same path.
    if !buffer.is_empty() {
        flush_selection(&inner, &mut buffer);
    }

    info!("Select loop stopped");
}

fn flush_selection(inner: &ServiceInner, buffer: &mut Vec<FrameScore>) {
    let dynamic_k = inner.selector.dynamic_target(buffer.len());
    let result = inner.selector.select_from(buffer, dynamic_k);

    debug!(
        selected = result.selected_frames,
        total = buffer.len(),
        "Selection window flushed"
    );

    for score in result.keyframe_scores {
        {
            let mut stats = inner.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.total_keyframes += 1;
            stats.latest_keyframes.push(KeyframeSummary {
                frame_index: score.frame_index,
                score: score.final_score,
                timestamp: score.timestamp,
            });
            if stats.latest_keyframes.len() > 20 {
                stats.latest_keyframes.remove(0);
            }
        }
        metrics::counter!("fsift_analyzer_keyframes_selected").increment(1);

        let frame_index = score.frame_index;
        if !inner.selected_queue.push_timeout(score, STAGE_TIMEOUT) {
            warn!(frame_index, "Selected queue full, dropping keyframe");
        }
    }

    buffer.clear();
}

fn publish_loop(inner: Arc<ServiceInner>, mut sink: Box<dyn MessageSink>) {
    info!("Publish loop started");

    while inner.running.load(Ordering::SeqCst) || !inner.selected_queue.is_empty() {
        let Some(score) = inner.selected_queue.pop_timeout(STAGE_TIMEOUT) else {
            continue;
        };

        let meta = KeyframeMetadata {
            frame_id: score.frame_index,
            timestamp_ms: (score.timestamp * 1000.0) as u64,
            final_score: score.final_score,
            scene_score: score.scene_contribution,
            motion_score: score.motion_contribution,
            text_score: score.text_contribution,
            is_scene_change: score.is_scene_change(),
        };

        if let Err(error) = sink.send(&serialize_metadata(&meta)) {
            warn!(frame_id = meta.frame_id, %error, "Failed to publish keyframe metadata");
        } else {
            metrics::counter!("fsift_analyzer_keyframes_published").increment(1);
        }
    }

    sink.close();
    info!("Publish loop stopped");
}
