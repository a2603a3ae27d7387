//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

/// Metadata about a stored artifact.
#[derive(Clone, Debug)]
pub struct ArtifactMeta {
    /// Artifact size in bytes.
    pub size: u64,
    /// Last modification time (if the backend tracks one).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Artifact store abstraction for derived image files.
///
/// Keys are forward-slash relative paths under the backend root. URL
/// capability is expressed by [`root_url`](ArtifactStore::root_url)
/// returning `Some`; local re-verification is an optional capability
/// surfaced through [`local`](ArtifactStore::local).
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Check if an artifact exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an artifact's size and modification time without fetching content.
    async fn metadata(&self, key: &str) -> StorageResult<ArtifactMeta>;

    /// Get an artifact's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an artifact atomically.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Upload a local file (typically a raster engine temp output) to a key.
    async fn write_file(&self, key: &str, source: &Path) -> StorageResult<()>;

    /// Copy an artifact to another key.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete an artifact.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public base URL artifacts are served under, without a trailing slash.
    /// `None` means this backend cannot serve URLs at all.
    fn root_url(&self) -> Option<&str>;

    /// Static identifier for the backend type, used for logging.
    fn backend_name(&self) -> &'static str;

    /// Direct-disk re-verification capability, if the backend is local.
    /// Used to detect drift between index metadata and actual storage.
    fn local(&self) -> Option<&dyn LocalVerify> {
        None
    }
}

/// Capability trait for backends that can cheaply re-verify existence
/// against the actual filesystem, bypassing any cached state.
#[async_trait]
pub trait LocalVerify: Send + Sync {
    /// Re-check that the artifact really is on disk.
    async fn verify_exists(&self, key: &str) -> StorageResult<bool>;
}
