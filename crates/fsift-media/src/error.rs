//! Error types for analysis operations.

use thiserror::Error;

/// Result type for analysis operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during frame analysis.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("preprocessing failed: {0}")]
    PreprocessFailed(String),

    #[error("detection failed: {0}")]
    DetectionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an inference failure error.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a preprocessing failure error.
    pub fn preprocess(message: impl Into<String>) -> Self {
        Self::PreprocessFailed(message.into())
    }

    /// Create a detection failure error.
    pub fn detection(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
