//! Error types for the recorder process.

use thiserror::Error;

/// Result type for recorder operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Errors surfaced by the recorder service and API.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("not initialized")]
    NotInitialized,

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("invalid configuration:\n{0}")]
    InvalidConfig(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("encoder failed: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(#[from] fsift_proto::ProtoError),
}
