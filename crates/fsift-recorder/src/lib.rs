//! The recorder process: captures frames from a pluggable grabber at a
//! target rate, hands them to an opaque video encoder, keeps recent
//! frames in a ring buffer and publishes every frame on the message bus.
//! Controlled over the same request/reply protocol as the analyzer.

pub mod api;
pub mod builder;
pub mod control;
pub mod encoder;
pub mod error;
pub mod grabber;
pub mod ring;
pub mod service;
pub mod settings;

pub use api::RecorderApi;
pub use builder::KeyframeVideoBuilder;
pub use control::RecorderCommandHandler;
pub use encoder::{NullEncoder, VideoEncoderSink};
pub use error::{RecorderError, RecorderResult};
pub use grabber::{CapturedFrame, FrameGrabber, SyntheticGrabber};
pub use ring::RingFrameBuffer;
pub use service::RecorderService;
