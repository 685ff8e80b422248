//! Shared data models for the FrameSift pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Raw frames and per-frame analysis context
//! - Bounding boxes, motion tracks and text regions
//! - Multi-dimension detector scores and fused frame scores
//! - Service status, analyzer/recorder stats
//! - The unified configuration with structured validation

pub mod config;
pub mod context;
pub mod frame;
pub mod rect;
pub mod score;
pub mod status;
pub mod text;
pub mod track;

// Re-export common types
pub use config::{
    AnalyzerConfig, DynamicCalculatorConfig, FrameScorerConfig, KeyframeDetectorConfig,
    ModelsConfig, MotionDetectorConfig, PipelineConfig, RecorderConfig, SceneDetectorConfig,
    TextDetectorConfig, TransportConfig, ValidationReport,
};
pub use context::AnalysisContext;
pub use frame::Frame;
pub use rect::BoundingBox;
pub use score::{
    FrameScore, MotionResult, MultiDimensionScore, SceneChangeResult, TextResult, DEFAULT_WEIGHTS,
};
pub use status::{AnalyzerStats, KeyframeSummary, RecorderStats, RingBufferStats, ServiceStatus};
pub use text::TextRegion;
pub use track::Track;
