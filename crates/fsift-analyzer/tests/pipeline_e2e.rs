//! End-to-end pipeline tests: recorder → frame bus → analyzer →
//! metadata bus → keyframe video builder, all in-process over the
//! loopback transport with stub inference.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fsift_analyzer::AnalyzerService;
use fsift_media::registry::{MOTION_MODEL, SCENE_MODEL, TEXT_DET_MODEL};
use fsift_media::{ModelRegistry, StubBackend};
use fsift_models::{AnalyzerConfig, RecorderConfig};
use fsift_proto::loopback;
use fsift_proto::wire::deserialize_metadata;
use fsift_proto::{MessageSink, MessageSource};
use fsift_recorder::{KeyframeVideoBuilder, NullEncoder, RecorderService, SyntheticGrabber};

const SIZE: u32 = 32;

fn stub_registry() -> Arc<ModelRegistry> {
    Arc::new(
        StubBackend::new()
            .register_constant(SCENE_MODEL, vec![vec![1.0, 0.0, 0.0, 0.0]])
            .register_constant(MOTION_MODEL, vec![vec![0.0; 84 * 8400]])
            .register_constant(TEXT_DET_MODEL, vec![vec![0.0; (SIZE * SIZE) as usize]])
            .into_registry(),
    )
}

fn analyzer_config() -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    config.pipeline.analysis_thread_count = 2;
    config.scene_detector.input_size = SIZE;
    config.scene_detector.feature_dim = 4;
    config.motion_detector.input_width = SIZE;
    config.text_detector.det_input_height = SIZE;
    config.text_detector.det_input_width = SIZE;
    // The synthetic gradient scores low; select on the floor so the
    // window discipline itself is what gets exercised.
    config.keyframe_detector.min_score_threshold = 0.0;
    config.keyframe_detector.min_temporal_distance = 0.001;
    config.transport.timeout_ms = 20;
    config
}

fn recorder_config() -> RecorderConfig {
    RecorderConfig {
        target_fps: 100,
        capture_width: SIZE,
        capture_height: SIZE,
        ring_capacity: 4096,
        frame_queue_size: 256,
        ..Default::default()
    }
}

#[test]
fn test_recorder_to_analyzer_to_keyframe_video() {
    let (frame_tx, frame_rx) = loopback(512);
    let (meta_tx, mut meta_rx) = loopback(512);

    let recorder = RecorderService::new(
        recorder_config(),
        Box::new(SyntheticGrabber::new(SIZE, SIZE)),
        Box::new(NullEncoder::new()),
        Box::new(frame_tx),
    );
    let analyzer = AnalyzerService::new(
        analyzer_config(),
        stub_registry(),
        Box::new(frame_rx),
        Box::new(meta_tx),
    );

    recorder.start().unwrap();
    analyzer.start().unwrap();

    // Capture long enough for at least two full selection windows.
    let deadline = Instant::now() + Duration::from_secs(20);
    while analyzer.stats().analyzed_frame_count < 60 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(
        analyzer.stats().analyzed_frame_count >= 60,
        "pipeline too slow: {} frames analyzed",
        analyzer.stats().analyzed_frame_count
    );

    recorder.stop();
    analyzer.stop();

    let stats = analyzer.stats();
    assert!(stats.keyframe_count >= 2, "at least one keyframe per window");
    assert!(stats.latest_keyframes.len() <= 20);

    // Metadata on the bus decodes and carries sane values.
    let mut metadata = Vec::new();
    loop {
        match meta_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(bytes)) => metadata.push(deserialize_metadata(&bytes).unwrap()),
            Ok(None) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(metadata.len() as i64, stats.keyframe_count);
    for meta in &metadata {
        assert!(meta.final_score >= 0.0 && meta.final_score <= 1.0);
        assert!(meta.frame_id >= 1, "recorder ids start at 1");
    }

    // The keyframe ids resolve against the recorder's ring buffer.
    let ring = recorder.ring();
    let builder = KeyframeVideoBuilder::new(Arc::clone(&ring));
    let (mut replay_tx, replay_rx) = loopback(512);
    let encoder = NullEncoder::new();
    let written = encoder.frames_written_handle();
    builder
        .start(Box::new(replay_rx), Box::new(encoder), SIZE, SIZE, 30)
        .unwrap();
    for meta in &metadata {
        replay_tx
            .send(&fsift_proto::wire::serialize_metadata(meta))
            .unwrap();
    }
    replay_tx.close();

    let deadline = Instant::now() + Duration::from_secs(5);
    while (builder.written_count() + builder.missed_count()) < metadata.len() as u64
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(10));
    }
    builder.stop();

    assert_eq!(
        builder.written_count() + builder.missed_count(),
        metadata.len() as u64
    );
    // The ring is big enough here that nothing was overwritten.
    assert_eq!(builder.missed_count(), 0);
    assert_eq!(
        written.load(std::sync::atomic::Ordering::Relaxed),
        metadata.len() as u64
    );
}

#[test]
fn test_multi_worker_scores_every_frame() {
    let (frame_tx, frame_rx) = loopback(1024);
    let (meta_tx, _meta_rx) = loopback(1024);

    let mut config = analyzer_config();
    config.pipeline.analysis_thread_count = 4;

    let analyzer = AnalyzerService::new(
        config,
        stub_registry(),
        Box::new(frame_rx),
        Box::new(meta_tx),
    );
    analyzer.start().unwrap();

    let mut sender = frame_tx;
    for id in 0..90u32 {
        let frame = fsift_models::Frame::new(
            id,
            id as u64 * 50,
            SIZE,
            SIZE,
            3,
            vec![((id * 3) % 256) as u8; (SIZE * SIZE * 3) as usize],
        );
        // Retry until the bounded bus accepts the frame.
        let payload = fsift_proto::wire::serialize_frame(&frame);
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match sender.send(&payload) {
                Ok(()) => break,
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Err(error) => panic!("bus never drained: {error}"),
            }
        }
    }

    let deadline = Instant::now() + Duration::from_secs(20);
    while analyzer.stats().analyzed_frame_count < 90 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    analyzer.stop();

    let stats = analyzer.stats();
    assert_eq!(stats.analyzed_frame_count, 90);
    // Three full windows flushed, each selecting at least the minimum.
    assert!(stats.keyframe_count >= 3);
    assert!(analyzer.input_error_count() == 0);
}
