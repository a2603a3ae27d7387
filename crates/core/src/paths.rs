//! Artifact key derivation.
//!
//! Derived artifacts live under the asset's folder, in a subfolder named
//! after the transform's geometry string:
//!
//! ```text
//! {folder_path}{transform_string}/{filename}
//! {folder_path}{transform_string}/{asset_id}/{filename}   (renamed output)
//! ```
//!
//! The extra asset-id segment appears when the output filename differs from
//! the source filename (format conversion changes the extension), so two
//! assets named `photo.tiff` and `photo.bmp` in the same folder cannot
//! collide on `photo.jpg`.

use crate::asset::Asset;

/// The output filename for an index row: the stored filename if one has
/// been derived, otherwise the source filename.
pub fn transform_filename<'a>(asset: &'a Asset, index_filename: Option<&'a str>) -> &'a str {
    match index_filename {
        Some(name) if !name.is_empty() => name,
        _ => &asset.filename,
    }
}

/// The subfolder holding one transform's artifact for an asset.
pub fn transform_subfolder(asset: &Asset, transform_string: &str, filename: &str) -> String {
    if filename != asset.filename {
        format!("{transform_string}/{}", asset.id)
    } else {
        transform_string.to_string()
    }
}

/// Full storage key for a transform artifact, relative to the backend root.
/// Always uses forward slashes.
pub fn artifact_key(asset: &Asset, transform_string: &str, index_filename: Option<&str>) -> String {
    let filename = transform_filename(asset, index_filename);
    let subfolder = transform_subfolder(asset, transform_string, filename);
    let mut folder = asset.folder_path.replace('\\', "/");
    if !folder.is_empty() && !folder.ends_with('/') {
        folder.push('/');
    }
    format!("{folder}{subfolder}/{filename}")
}
