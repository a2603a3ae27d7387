//! Transform pipeline error types.

use darkroom_metadata::MetadataError;
use darkroom_storage::StorageError;
use thiserror::Error;

/// Transform pipeline errors.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The artifact storage backend has no root URL, so transform URLs
    /// cannot be served at all.
    #[error("the artifact storage backend does not serve URLs")]
    NotSupported,

    /// Generation failed: raster failure, storage write failure, reuse-copy
    /// failure, post-generation existence check failure, or a concurrent
    /// worker recorded an error while we were waiting on it.
    #[error("failed to generate transform for index {index_id}: {reason}")]
    Generation { index_id: i64, reason: String },

    /// Raster engine decode/render/encode failure, before it is attributed
    /// to a specific index row.
    #[error("raster operation failed: {0}")]
    Raster(String),

    #[error("asset not found: {0}")]
    AssetNotFound(i64),

    #[error("named transform not found: {0}")]
    TransformNotFound(String),

    #[error(transparent)]
    Core(#[from] darkroom_core::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransformError {
    pub(crate) fn generation(index_id: i64, reason: impl Into<String>) -> Self {
        TransformError::Generation {
            index_id,
            reason: reason.into(),
        }
    }
}

/// Result type for transform pipeline operations.
pub type TransformResult<T> = std::result::Result<T, TransformError>;
