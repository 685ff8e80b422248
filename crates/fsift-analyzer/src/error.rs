//! Error types for the analyzer process.

use thiserror::Error;

/// Result type for pipeline and API operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the analyzer service and API.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not initialized")]
    NotInitialized,

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("invalid configuration:\n{0}")]
    InvalidConfig(String),

    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("transport error: {0}")]
    Transport(#[from] fsift_proto::ProtoError),

    #[error("analysis error: {0}")]
    Media(#[from] fsift_media::MediaError),
}
