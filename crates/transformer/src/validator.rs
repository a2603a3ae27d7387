//! Staleness validation for stored index rows.

use darkroom_core::{Asset, Transform};
use darkroom_metadata::TransformIndexRow;

/// Decide whether a stored index row is still usable for the given asset
/// and transform.
///
/// The check order matters: an unindexed row short-circuits to valid
/// before any timestamp comparison, and asset freshness is checked before
/// transform-definition freshness.
pub fn is_index_valid(row: &TransformIndexRow, transform: &Transform, asset: &Asset) -> bool {
    // Never indexed: nothing to compare against yet.
    let Some(date_indexed) = row.date_indexed else {
        return true;
    };

    // The asset changed after we cached its transform.
    if asset.date_modified > date_indexed {
        return false;
    }

    // Ad-hoc transforms have no definition that can drift.
    if !transform.is_named() {
        return true;
    }

    // The named transform's definition changed after indexing.
    match transform.parameter_change_time {
        Some(changed) => changed <= date_indexed,
        None => true,
    }
}
