//! Database models mapping to the transform index schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// A persisted transform index row: the cache entry for one
/// (asset, transform geometry, output format) artifact.
#[derive(Debug, Clone, FromRow)]
pub struct TransformIndexRow {
    pub id: i64,
    pub asset_id: i64,
    /// Name of the transformer that owns this row.
    pub transformer: String,
    /// Derived output filename, once the output format is known. May differ
    /// from the source filename when the format changes the extension.
    pub filename: Option<String>,
    /// Explicitly requested output format, or `NULL` for auto-detect.
    pub format: Option<String>,
    /// Geometry fingerprint of the transform.
    pub transform_string: String,
    pub file_exists: bool,
    pub in_progress: bool,
    pub error: bool,
    /// When this row was last (re)indexed against the source asset.
    pub date_indexed: Option<OffsetDateTime>,
    pub date_updated: OffsetDateTime,
    pub date_created: OffsetDateTime,
}

impl TransformIndexRow {
    /// Combined fingerprint of this row, matching
    /// [`darkroom_core::index_fingerprint`] for the originating request.
    pub fn fingerprint(&self) -> String {
        match &self.format {
            Some(format) => format!("{}:{}:{format}", self.asset_id, self.transform_string),
            None => format!("{}:{}", self.asset_id, self.transform_string),
        }
    }
}

/// Fields for inserting a fresh transform index row. The store assigns the
/// id and the created/updated timestamps.
#[derive(Debug, Clone)]
pub struct NewTransformIndex {
    pub asset_id: i64,
    pub transformer: String,
    pub filename: Option<String>,
    pub format: Option<String>,
    pub transform_string: String,
    pub file_exists: bool,
    pub in_progress: bool,
    pub error: bool,
    pub date_indexed: Option<OffsetDateTime>,
}

impl NewTransformIndex {
    /// A never-attempted row for the given fingerprint, indexed now.
    pub fn pending(
        asset_id: i64,
        transform_string: String,
        format: Option<String>,
        indexed_at: OffsetDateTime,
    ) -> Self {
        Self {
            asset_id,
            transformer: "darkroom".to_string(),
            filename: None,
            format,
            transform_string,
            file_exists: false,
            in_progress: false,
            error: false,
            date_indexed: Some(indexed_at),
        }
    }
}
