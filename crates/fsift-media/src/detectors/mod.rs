//! The three per-frame detectors.
//!
//! Each detector is independently stateful behind an interior lock and
//! degrades to a default result when its model is missing or inference
//! fails. Parallelism happens across frames; within a frame the analyzer
//! fans the three out as separate tasks.

pub mod motion;
pub mod scene;
pub mod text;
pub mod tracker;

pub use motion::MotionDetector;
pub use scene::SceneChangeDetector;
pub use text::TextDetector;
pub use tracker::{Detection, IouTracker, TrackerDelta};
