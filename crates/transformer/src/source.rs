//! Collaborator boundaries into the surrounding element framework.

use crate::error::TransformResult;
use async_trait::async_trait;
use bytes::Bytes;
use darkroom_core::{Asset, Transform};

/// Access to asset records and their source bytes.
///
/// The element/ORM layer that owns assets lives outside this system; the
/// pipeline only needs lookups by id (for queued jobs that carry nothing
/// but an index row id) and source reads.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Look up an asset record by id.
    async fn asset(&self, id: i64) -> TransformResult<Option<Asset>>;

    /// Read the asset's source image bytes.
    async fn read(&self, asset: &Asset) -> TransformResult<Bytes>;
}

/// Resolution of named transform definitions.
///
/// Index rows persist only the fingerprint. Anonymous fingerprints parse
/// back into a transform; name forms need the registry that owns the
/// persisted definitions.
#[async_trait]
pub trait TransformRegistry: Send + Sync {
    /// Look up a named transform definition by its handle.
    async fn by_name(&self, name: &str) -> TransformResult<Option<Transform>>;
}

/// A registry for deployments that only ever use ad-hoc transforms.
pub struct NoNamedTransforms;

#[async_trait]
impl TransformRegistry for NoNamedTransforms {
    async fn by_name(&self, _name: &str) -> TransformResult<Option<Transform>> {
        Ok(None)
    }
}
