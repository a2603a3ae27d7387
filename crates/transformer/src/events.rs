//! Observer hooks around artifact generation and deletion.

use darkroom_core::Asset;
use darkroom_metadata::TransformIndexRow;
use std::path::{Path, PathBuf};

/// Context for a just-generated artifact, before it is uploaded.
pub struct TransformGenerated<'a> {
    pub asset: &'a Asset,
    pub index: &'a TransformIndexRow,
    /// Storage key the artifact will be written to.
    pub key: &'a str,
    /// Raster engine output on local disk.
    pub temp_path: &'a Path,
}

/// Extension point for host systems that want to post-process artifacts
/// (watermarking, optimization) or react to deletions.
pub trait TransformObserver: Send + Sync {
    /// Called after the raster engine produced a temp file and before it is
    /// uploaded. Returning a path substitutes it for the upload; the
    /// observer owns cleanup of the original in that case.
    fn transform_generated(&self, _event: &TransformGenerated<'_>) -> Option<PathBuf> {
        None
    }

    /// Called before a generated artifact is deleted from storage.
    fn artifact_deleting(&self, _asset: &Asset, _index: &TransformIndexRow, _key: &str) {}
}
