//! Frame analysis core: detectors, scoring and keyframe selection.
//!
//! # Architecture
//!
//! ```text
//! Frame bytes
//!     │
//!     ▼
//! ┌───────────────────┐
//! │   FrameResource   │ ← memoized per-frame preprocessing
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐
//! │ StandardFrame-    │ ← scene/motion/text detectors, one task each
//! │ Analyzer          │
//! └─────────┬─────────┘
//!           │ MultiDimensionScore
//!           ▼
//! ┌───────────────────┐
//! │    FrameScorer    │ ← dynamic weights, boosts, temporal smoothing
//! └─────────┬─────────┘
//!           │ FrameScore
//!           ▼
//! ┌───────────────────┐
//! │ KeyframeSelector  │ ← greedy pick under temporal/count constraints
//! └───────────────────┘
//! ```
//!
//! Detectors are stateful and interior-locked; cross-frame parallelism is
//! the intended concurrency model. Model inference goes through
//! [`registry::ModelRegistry`], handed to each detector at construction.

pub mod analyzer;
pub mod detectors;
pub mod error;
pub mod pixel;
pub mod preprocess;
pub mod registry;
pub mod resource;
pub mod scoring;
pub mod selector;

pub use analyzer::StandardFrameAnalyzer;
pub use detectors::{MotionDetector, SceneChangeDetector, TextDetector};
pub use error::{MediaError, MediaResult};
pub use preprocess::LetterboxInfo;
pub use registry::{InferenceBackend, ModelRegistry, OrtBackend, StubBackend};
pub use resource::{FrameResource, TensorVariant};
pub use scoring::{ActivationStats, DynamicWeightCalculator, FrameScorer};
pub use selector::{KeyframeSelector, SelectionResult};
