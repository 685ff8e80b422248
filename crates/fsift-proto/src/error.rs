//! Error types for protocol and transport operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors raised while framing, parsing or moving messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("message truncated: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad magic number: 0x{found:08X}")]
    BadMagic { found: u32 },

    #[error("CRC32 verification failed")]
    BadCrc,

    #[error("transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
