//! Artifact reuse: finding pixel-identical completed artifacts.
//!
//! Two index rows can describe the same pixels: a named transform and an
//! anonymous transform with the same geometry raster identically. Reuse
//! copies the existing artifact instead of re-rastering. Donor rows are
//! matched on the resolved output format, so an explicit-format donor can
//! serve an auto-detect request that resolves to the same format.

use crate::error::TransformResult;
use darkroom_core::{transform_string, Asset, ImageFormat, Transform};
use darkroom_metadata::{MetadataStore, TransformIndexRow};

/// Every geometry fingerprint under which a pixel-identical artifact could
/// have been indexed: the anonymous form always, plus the name form for
/// named transforms.
pub fn candidate_fingerprints(transform: &Transform) -> Vec<String> {
    let mut candidates = vec![transform_string(transform, true)];
    if transform.is_named() {
        candidates.push(transform_string(transform, false));
    }
    candidates
}

/// Whether reuse matching applies at all.
///
/// It requires the asset's own format to equal the resolved output format
/// (otherwise candidates could have been encoded differently), and no
/// focal point (a focal point changes crop geometry without changing the
/// fingerprint).
pub fn reuse_applicable(asset: &Asset, resolved_format: ImageFormat) -> bool {
    if asset.has_focal_point() {
        return false;
    }
    matches!(ImageFormat::parse(asset.extension()), Ok(f) if f == resolved_format)
}

/// Find a completed row whose artifact can be copied for `row`, if any.
/// Deterministic: the lowest id wins.
pub async fn find_reusable(
    store: &dyn MetadataStore,
    asset: &Asset,
    transform: &Transform,
    resolved_format: ImageFormat,
    row: &TransformIndexRow,
) -> TransformResult<Option<TransformIndexRow>> {
    if !reuse_applicable(asset, resolved_format) {
        return Ok(None);
    }
    let candidates = candidate_fingerprints(transform);
    // Donors are matched on the resolved output format. Auto-detect rows
    // store a NULL format and never serve as donors.
    let found = store
        .find_similar(asset.id, &candidates, resolved_format.as_str(), row.id)
        .await?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_core::FocalPoint;
    use time::macros::datetime;

    fn asset(filename: &str) -> Asset {
        Asset {
            id: 1,
            filename: filename.to_string(),
            folder_path: "photos/".to_string(),
            width: Some(4000),
            height: Some(3000),
            date_modified: datetime!(2026-01-01 00:00 UTC),
            focal_point: None,
        }
    }

    #[test]
    fn anonymous_transform_has_one_candidate() {
        let t = Transform::sized(100, 100);
        assert_eq!(
            candidate_fingerprints(&t),
            vec!["_100x100_crop_center-center_none".to_string()]
        );
    }

    #[test]
    fn named_transform_has_both_forms() {
        let mut t = Transform::sized(100, 100);
        t.name = Some("thumb".to_string());
        assert_eq!(
            candidate_fingerprints(&t),
            vec![
                "_100x100_crop_center-center_none".to_string(),
                "_thumb".to_string(),
            ]
        );
    }

    #[test]
    fn reuse_requires_matching_format() {
        assert!(reuse_applicable(&asset("a.jpg"), ImageFormat::Jpg));
        assert!(reuse_applicable(&asset("a.JPEG"), ImageFormat::Jpg));
        assert!(!reuse_applicable(&asset("a.png"), ImageFormat::Jpg));
        // Non-web-safe sources never match a resolved output format.
        assert!(!reuse_applicable(&asset("a.tiff"), ImageFormat::Jpg));
    }

    #[test]
    fn focal_point_disables_reuse() {
        let mut a = asset("a.jpg");
        a.focal_point = Some(FocalPoint { x: 0.3, y: 0.7 });
        assert!(!reuse_applicable(&a, ImageFormat::Jpg));
    }
}
