//! Asset descriptors: the source images whose variants we derive.

use crate::transform::ImageFormat;
use time::OffsetDateTime;

/// A focal point override, as fractions of the image dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FocalPoint {
    pub x: f64,
    pub y: f64,
}

/// An uploaded source image. The element/ORM layer that owns the full asset
/// record lives outside this system; this is the slice of it the transform
/// pipeline needs.
#[derive(Clone, Debug)]
pub struct Asset {
    pub id: i64,
    /// Source filename including extension, e.g. `beach.jpg`.
    pub filename: String,
    /// Folder path relative to the volume root, e.g. `photos/2024/`.
    pub folder_path: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// When the source file last changed.
    pub date_modified: OffsetDateTime,
    /// Crop focal point, if the editor has set one. A focal point changes
    /// crop geometry, which disqualifies naive artifact reuse.
    pub focal_point: Option<FocalPoint>,
}

impl Asset {
    /// File extension of the source, without the dot.
    pub fn extension(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or("")
    }

    /// Filename without the extension.
    pub fn filename_stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }

    pub fn has_focal_point(&self) -> bool {
        self.focal_point.is_some()
    }

    /// The output format a transform without an explicit format resolves to.
    ///
    /// Web-safe sources keep their own format; anything else (tiff, bmp,
    /// raw camera formats) falls back to jpg.
    pub fn detect_transform_format(&self) -> ImageFormat {
        ImageFormat::parse(self.extension()).unwrap_or(ImageFormat::Jpg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn extension_and_stem() {
        let a = asset("beach.sunset.JPG");
        assert_eq!(a.extension(), "JPG");
        assert_eq!(a.filename_stem(), "beach.sunset");

        let bare = asset("README");
        assert_eq!(bare.extension(), "");
        assert_eq!(bare.filename_stem(), "README");
    }

    #[test]
    fn detect_format_keeps_web_safe_extension() {
        assert_eq!(asset("a.webp").detect_transform_format(), ImageFormat::Webp);
        assert_eq!(asset("a.png").detect_transform_format(), ImageFormat::Png);
    }

    #[test]
    fn detect_format_falls_back_to_jpg() {
        assert_eq!(asset("a.tiff").detect_transform_format(), ImageFormat::Jpg);
        assert_eq!(asset("a.cr2").detect_transform_format(), ImageFormat::Jpg);
    }
}
