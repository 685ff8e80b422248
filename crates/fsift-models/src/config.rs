//! Unified configuration for the recorder and analyzer processes.
//!
//! Every group carries documented defaults; `validate()` returns a
//! structured report of errors and warnings instead of failing on the
//! first problem. Any error fails service initialization.

use serde::{Deserialize, Serialize};

/// Outcome of validating a configuration: hard errors plus advisory
/// warnings. Errors fail initialization; warnings are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    fn check_range(&mut self, value: f32, min: f32, max: f32, name: &str) {
        if value < min || value > max {
            self.error(format!(
                "{name} must be in range [{min}, {max}], got {value}"
            ));
        }
    }

    fn check_positive_i(&mut self, value: i64, name: &str) {
        if value <= 0 {
            self.error(format!("{name} must be positive, got {value}"));
        }
    }

    fn check_positive_f(&mut self, value: f32, name: &str) {
        if value <= 0.0 {
            self.error(format!("{name} must be positive, got {value}"));
        }
    }

    fn check_weight_sum(&mut self, sum: f32, name: &str) {
        if (sum - 1.0).abs() > 0.01 {
            self.warn(format!("{name} sum to {sum}, expected 1.0"));
        }
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return f.write_str("No issues found.");
        }
        if !self.errors.is_empty() {
            writeln!(f, "Errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {err}")?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warn in &self.warnings {
                writeln!(f, "  - {warn}")?;
            }
        }
        Ok(())
    }
}

/// Endpoints and socket options, passed through to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub subscriber_endpoint: String,
    pub publisher_endpoint: String,
    pub timeout_ms: u64,
    pub io_threads: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            subscriber_endpoint: "tcp://localhost:5555".to_string(),
            publisher_endpoint: "tcp://*:5556".to_string(),
            timeout_ms: 100,
            io_threads: 1,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        if self.subscriber_endpoint.is_empty() {
            report.error("subscriber_endpoint must not be empty");
        }
        if self.publisher_endpoint.is_empty() {
            report.error("publisher_endpoint must not be empty");
        }
        report.check_positive_i(self.io_threads as i64, "io_threads");
        report
    }
}

/// Model names handed opaquely to the inference facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub base_path: String,
    pub scene_model_path: String,
    pub motion_model_path: String,
    pub text_det_model_path: String,
    pub text_rec_model_path: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_path: "models".to_string(),
            scene_model_path: "mobilenet-v3-small.onnx".to_string(),
            motion_model_path: "yolov8n.onnx".to_string(),
            text_det_model_path: "ppocr-v4-det.onnx".to_string(),
            text_rec_model_path: String::new(),
        }
    }
}

/// Motion detector and tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionDetectorConfig {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    /// Square letterbox edge for the detection model input.
    pub input_width: u32,
    pub max_tracked_objects: u32,
    /// Minimum confidence for an unmatched detection to spawn a track.
    pub track_high_threshold: f32,
    pub track_low_threshold: f32,
    /// Missed frames before a lost track is destroyed.
    pub track_buffer_size: u32,
    pub pixel_motion_weight: f32,
    pub object_motion_weight: f32,
}

impl Default for MotionDetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_width: 640,
            max_tracked_objects: 50,
            track_high_threshold: 0.6,
            track_low_threshold: 0.1,
            track_buffer_size: 30,
            pixel_motion_weight: 0.8,
            object_motion_weight: 0.2,
        }
    }
}

impl MotionDetectorConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_range(self.confidence_threshold, 0.0, 1.0, "confidence_threshold");
        report.check_range(self.nms_threshold, 0.0, 1.0, "nms_threshold");
        report.check_positive_i(self.input_width as i64, "input_width");
        report.check_range(self.track_high_threshold, 0.0, 1.0, "track_high_threshold");
        report.check_range(self.track_low_threshold, 0.0, 1.0, "track_low_threshold");
        report.check_positive_i(self.track_buffer_size as i64, "track_buffer_size");
        report.check_weight_sum(
            self.pixel_motion_weight + self.object_motion_weight,
            "motion weights",
        );
        report
    }
}

/// Scene change detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDetectorConfig {
    /// Cosine similarity below this flags a scene change.
    pub similarity_threshold: f32,
    pub feature_dim: u32,
    /// Square model input edge.
    pub input_size: u32,
    pub enable_cache: bool,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            feature_dim: 1000,
            input_size: 224,
            enable_cache: true,
        }
    }
}

impl SceneDetectorConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_range(self.similarity_threshold, 0.0, 1.0, "similarity_threshold");
        report.check_positive_i(self.feature_dim as i64, "feature_dim");
        report.check_positive_i(self.input_size as i64, "input_size");
        report
    }
}

/// Text detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextDetectorConfig {
    pub det_input_height: u32,
    pub det_input_width: u32,
    pub rec_input_height: u32,
    pub rec_input_width: u32,
    pub det_threshold: f32,
    pub rec_threshold: f32,
    pub enable_recognition: bool,
    /// Coverage-ratio weight in the text score.
    pub alpha: f32,
    /// Change-ratio weight in the text score.
    pub beta: f32,
}

impl Default for TextDetectorConfig {
    fn default() -> Self {
        Self {
            det_input_height: 960,
            det_input_width: 960,
            rec_input_height: 48,
            rec_input_width: 320,
            det_threshold: 0.3,
            rec_threshold: 0.5,
            enable_recognition: false,
            alpha: 0.6,
            beta: 0.4,
        }
    }
}

impl TextDetectorConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_positive_i(self.det_input_height as i64, "det_input_height");
        report.check_positive_i(self.det_input_width as i64, "det_input_width");
        report.check_positive_i(self.rec_input_height as i64, "rec_input_height");
        report.check_positive_i(self.rec_input_width as i64, "rec_input_width");
        report.check_range(self.det_threshold, 0.0, 1.0, "det_threshold");
        report.check_range(self.rec_threshold, 0.0, 1.0, "rec_threshold");
        report.check_weight_sum(self.alpha + self.beta, "text score weights");
        report
    }
}

/// Dynamic weight calculator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicCalculatorConfig {
    /// Base fusion weights: scene, motion, text.
    pub base_weights: [f32; 3],
    /// Blend factor between the current frame and the history average.
    pub current_frame_weight: f32,
    /// How strongly activation scales the base weights.
    pub activation_influence: f32,
    pub history_window_size: u32,
    pub min_weight: f32,
    pub max_weight: f32,
}

impl Default for DynamicCalculatorConfig {
    fn default() -> Self {
        Self {
            base_weights: [0.45, 0.2, 0.35],
            current_frame_weight: 0.3,
            activation_influence: 0.5,
            history_window_size: 30,
            min_weight: 0.05,
            max_weight: 0.7,
        }
    }
}

impl DynamicCalculatorConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_weight_sum(self.base_weights.iter().sum(), "base_weights");
        report.check_range(self.current_frame_weight, 0.0, 1.0, "current_frame_weight");
        report.check_range(self.activation_influence, 0.0, 1.0, "activation_influence");
        report.check_positive_i(self.history_window_size as i64, "history_window_size");
        if self.min_weight >= self.max_weight {
            report.error(format!(
                "min_weight must be less than max_weight ({} >= {})",
                self.min_weight, self.max_weight
            ));
        }
        report
    }
}

/// Frame scorer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameScorerConfig {
    pub enable_dynamic_weighting: bool,
    pub enable_smoothing: bool,
    /// SMA window, used when `smoothing_ema_alpha` is 0 or out of range.
    pub smoothing_window_size: u32,
    /// EMA coefficient; in (0, 1] selects EMA smoothing.
    pub smoothing_ema_alpha: f32,
    pub scene_change_boost: f32,
    pub motion_increase_boost: f32,
    pub text_increase_boost: f32,
}

impl Default for FrameScorerConfig {
    fn default() -> Self {
        Self {
            enable_dynamic_weighting: true,
            enable_smoothing: true,
            smoothing_window_size: 3,
            smoothing_ema_alpha: 0.6,
            scene_change_boost: 1.2,
            motion_increase_boost: 1.1,
            text_increase_boost: 1.1,
        }
    }
}

impl FrameScorerConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_range(self.smoothing_ema_alpha, 0.0, 1.0, "smoothing_ema_alpha");
        report.check_range(self.scene_change_boost, 1.0, 2.0, "scene_change_boost");
        report.check_range(self.motion_increase_boost, 1.0, 2.0, "motion_increase_boost");
        report.check_range(self.text_increase_boost, 1.0, 2.0, "text_increase_boost");
        report
    }
}

/// Keyframe selector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeDetectorConfig {
    pub target_keyframe_count: u32,
    /// Fraction of frames to keep when computing the per-window dynamic K.
    pub target_compression_ratio: f32,
    pub min_keyframe_count: u32,
    pub max_keyframe_count: u32,
    /// Minimum spacing between selected keyframes, in seconds.
    pub min_temporal_distance: f64,
    /// Threshold mode keeps everything above the score floor instead of
    /// capping at a per-window K.
    pub use_threshold_mode: bool,
    /// Carried for config compatibility; the selection path does not
    /// consult it.
    pub high_quality_threshold: f32,
    pub min_score_threshold: f32,
    pub always_include_scene_changes: bool,
}

impl Default for KeyframeDetectorConfig {
    fn default() -> Self {
        Self {
            target_keyframe_count: 50,
            target_compression_ratio: 0.1,
            min_keyframe_count: 1,
            max_keyframe_count: 10,
            min_temporal_distance: 1.0,
            use_threshold_mode: false,
            high_quality_threshold: 0.8,
            min_score_threshold: 0.3,
            always_include_scene_changes: true,
        }
    }
}

impl KeyframeDetectorConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_positive_i(self.target_keyframe_count as i64, "target_keyframe_count");
        if self.target_compression_ratio <= 0.0 || self.target_compression_ratio > 1.0 {
            report.error(format!(
                "target_compression_ratio must be in range (0, 1], got {}",
                self.target_compression_ratio
            ));
        }
        if self.min_keyframe_count > self.max_keyframe_count {
            report.error(format!(
                "min_keyframe_count must be <= max_keyframe_count ({} > {})",
                self.min_keyframe_count, self.max_keyframe_count
            ));
        }
        if self.min_temporal_distance <= 0.0 {
            report.error(format!(
                "min_temporal_distance must be positive, got {}",
                self.min_temporal_distance
            ));
        }
        report.check_range(self.high_quality_threshold, 0.0, 1.0, "high_quality_threshold");
        report.check_range(self.min_score_threshold, 0.0, 1.0, "min_score_threshold");
        report
    }
}

/// Pipeline sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub analysis_thread_count: u32,
    pub frame_buffer_size: usize,
    pub score_buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_thread_count: 4,
            frame_buffer_size: 100,
            score_buffer_size: 200,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        report.check_positive_i(self.analysis_thread_count as i64, "analysis_thread_count");
        report.check_positive_i(self.frame_buffer_size as i64, "frame_buffer_size");
        report.check_positive_i(self.score_buffer_size as i64, "score_buffer_size");
        report
    }
}

/// Unified analyzer-process configuration. This is the payload accepted by
/// `CONFIG_SET` on the control socket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub transport: TransportConfig,
    pub models: ModelsConfig,
    /// Global switch; the recognition model is only loaded when set.
    pub enable_text_recognition: bool,
    pub motion_detector: MotionDetectorConfig,
    pub scene_detector: SceneDetectorConfig,
    pub text_detector: TextDetectorConfig,
    pub dynamic_calculator: DynamicCalculatorConfig,
    pub frame_scorer: FrameScorerConfig,
    pub keyframe_detector: KeyframeDetectorConfig,
    pub pipeline: PipelineConfig,
}

impl AnalyzerConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = self.transport.validate();
        report.merge(self.motion_detector.validate());
        report.merge(self.scene_detector.validate());
        report.merge(self.text_detector.validate());
        report.merge(self.dynamic_calculator.validate());
        report.merge(self.frame_scorer.validate());
        report.merge(self.keyframe_detector.validate());
        report.merge(self.pipeline.validate());
        if self.enable_text_recognition && self.models.text_rec_model_path.is_empty() {
            report.error("text recognition enabled but text_rec_model_path is empty");
        }
        report
    }
}

/// Recorder-process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub transport: TransportConfig,
    pub target_fps: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Slots in the ring frame buffer keyed by frame id.
    pub ring_capacity: usize,
    /// Bound of the capture-to-encode queue.
    pub frame_queue_size: usize,
    pub output_path: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            target_fps: 30,
            capture_width: 1920,
            capture_height: 1080,
            ring_capacity: 300,
            frame_queue_size: 60,
            output_path: "recording.mp4".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> ValidationReport {
        let mut report = self.transport.validate();
        report.check_positive_i(self.target_fps as i64, "target_fps");
        report.check_positive_i(self.capture_width as i64, "capture_width");
        report.check_positive_i(self.capture_height as i64, "capture_height");
        report.check_positive_i(self.ring_capacity as i64, "ring_capacity");
        report.check_positive_i(self.frame_queue_size as i64, "frame_queue_size");
        if self.output_path.is_empty() {
            report.error("output_path must not be empty");
        }
        report
    }
}
