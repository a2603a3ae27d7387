//! Transform index repository trait.

use crate::error::MetadataResult;
use crate::models::{NewTransformIndex, TransformIndexRow};
use async_trait::async_trait;

/// A (transform_string, format) pair used in bulk eager-load queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintPair {
    pub transform_string: String,
    /// `None` matches only rows with a `NULL` format.
    pub format: Option<String>,
}

/// Repository for transform index rows.
///
/// No row-level locking is assumed. The only coordination primitive is
/// [`try_begin_generation`](TransformIndexRepo::try_begin_generation), a
/// compare-and-swap on the `in_progress` flag; everything else is
/// last-write-wins.
#[async_trait]
pub trait TransformIndexRepo: Send + Sync {
    /// Insert a fresh row and return its assigned id.
    async fn create_index(&self, row: &NewTransformIndex) -> MetadataResult<i64>;

    /// Full-row overwrite by id. Refreshes `date_updated`. Fails with
    /// `NotFound` if the id is absent.
    async fn update_index(&self, row: &TransformIndexRow) -> MetadataResult<()>;

    /// Fetch a row by id.
    async fn find_index(&self, id: i64) -> MetadataResult<Option<TransformIndexRow>>;

    /// Exact-match lookup by the soft-unique key. A `None` format matches
    /// only rows whose format is `NULL`.
    async fn find_by_fingerprint(
        &self,
        asset_id: i64,
        transform_string: &str,
        format: Option<&str>,
    ) -> MetadataResult<Option<TransformIndexRow>>;

    /// Find a completed row for the same asset whose fingerprint is in the
    /// candidate set and whose stored format equals the resolved output
    /// format, excluding `exclude_id`. Auto-detect rows store a `NULL`
    /// format and therefore never match. Deterministic: the lowest id wins.
    async fn find_similar(
        &self,
        asset_id: i64,
        transform_strings: &[String],
        format: &str,
        exclude_id: i64,
    ) -> MetadataResult<Option<TransformIndexRow>>;

    /// Bulk lookup for eager loading: any of `fingerprints` against any of
    /// `asset_ids`, in one query.
    async fn find_for_assets(
        &self,
        asset_ids: &[i64],
        fingerprints: &[FingerprintPair],
    ) -> MetadataResult<Vec<TransformIndexRow>>;

    /// Ids of rows that have never been attempted
    /// (`file_exists=0 AND in_progress=0 AND error=0`).
    async fn list_pending(&self) -> MetadataResult<Vec<i64>>;

    /// All rows for an asset.
    async fn list_for_asset(&self, asset_id: i64) -> MetadataResult<Vec<TransformIndexRow>>;

    /// Delete every row for an asset.
    async fn delete_by_asset(&self, asset_id: i64) -> MetadataResult<()>;

    /// Delete rows by id.
    async fn delete_by_ids(&self, ids: &[i64]) -> MetadataResult<()>;

    /// Compare-and-swap claim: set `in_progress` only where it is currently
    /// clear. Returns whether this caller won the claim.
    async fn try_begin_generation(&self, id: i64) -> MetadataResult<bool>;

    /// Refresh `date_updated` on a row that is still claimed
    /// (`in_progress=1`); released or missing rows are left untouched.
    /// Long generations call this periodically so polling workers can tell
    /// a slow claim holder from a dead one.
    async fn touch_index(&self, id: i64) -> MetadataResult<()>;
}
