//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown transform mode: {0}")]
    UnknownMode(String),

    #[error("unknown image format: {0}")]
    UnknownFormat(String),

    #[error("unknown crop position: {0}")]
    UnknownPosition(String),

    #[error("invalid quality: {0} (must be between 1 and 100)")]
    InvalidQuality(u32),

    #[error("invalid transform: {0}")]
    InvalidTransform(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
