//! Transform definitions: the desired output geometry, quality, and format.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// How the source image is fitted into the requested dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// Crop to exactly the requested dimensions.
    #[default]
    Crop,
    /// Scale to fit within the requested dimensions, preserving aspect ratio.
    Fit,
    /// Stretch to exactly the requested dimensions.
    Stretch,
    /// Scale to fit, then pad to the requested dimensions.
    Letterbox,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Crop => "crop",
            TransformMode::Fit => "fit",
            TransformMode::Stretch => "stretch",
            TransformMode::Letterbox => "letterbox",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "crop" => Ok(TransformMode::Crop),
            "fit" => Ok(TransformMode::Fit),
            "stretch" => Ok(TransformMode::Stretch),
            "letterbox" => Ok(TransformMode::Letterbox),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anchor position used by crop mode when the asset has no focal point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    CenterCenter,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::TopLeft => "top-left",
            Position::TopCenter => "top-center",
            Position::TopRight => "top-right",
            Position::CenterLeft => "center-left",
            Position::CenterCenter => "center-center",
            Position::CenterRight => "center-right",
            Position::BottomLeft => "bottom-left",
            Position::BottomCenter => "bottom-center",
            Position::BottomRight => "bottom-right",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "top-left" => Ok(Position::TopLeft),
            "top-center" => Ok(Position::TopCenter),
            "top-right" => Ok(Position::TopRight),
            "center-left" => Ok(Position::CenterLeft),
            "center-center" => Ok(Position::CenterCenter),
            "center-right" => Ok(Position::CenterRight),
            "bottom-left" => Ok(Position::BottomLeft),
            "bottom-center" => Ok(Position::BottomCenter),
            "bottom-right" => Ok(Position::BottomRight),
            other => Err(Error::UnknownPosition(other.to_string())),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interlace/progressive scan setting for the encoded output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interlace {
    #[default]
    None,
    Line,
    Plane,
}

impl Interlace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interlace::None => "none",
            Interlace::Line => "line",
            Interlace::Plane => "plane",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Interlace::None),
            "line" => Ok(Interlace::Line),
            "plane" => Ok(Interlace::Plane),
            other => Err(Error::InvalidTransform(format!(
                "unknown interlace setting: {other}"
            ))),
        }
    }
}

impl fmt::Display for Interlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output image formats the pipeline can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
    Gif,
    Webp,
    Avif,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
        }
    }

    /// Parse an extension or format name. `jpeg` normalizes to `jpg`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            "webp" => Ok(ImageFormat::Webp),
            "avif" => Ok(ImageFormat::Avif),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable description of desired image output.
///
/// A transform is either *named* (a persisted, reusable definition with a
/// human handle and a parameter-change timestamp) or *anonymous* (ad-hoc
/// geometry supplied at the call site).
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    /// Handle of a named transform definition, if any.
    pub name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: TransformMode,
    /// Encoder quality 1-100. `None` means the encoder default.
    pub quality: Option<u32>,
    /// Explicit output format. `None` means auto-detect from the asset.
    pub format: Option<ImageFormat>,
    pub interlace: Interlace,
    pub position: Position,
    /// When the named transform's definition last changed. Unset for
    /// anonymous transforms.
    pub parameter_change_time: Option<OffsetDateTime>,
}

impl Transform {
    /// An anonymous transform with the given dimensions and crop mode.
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            name: None,
            width: Some(width),
            height: Some(height),
            mode: TransformMode::default(),
            quality: None,
            format: None,
            interlace: Interlace::default(),
            position: Position::default(),
            parameter_change_time: None,
        }
    }

    /// Whether this is a named, reusable transform definition.
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Validate field ranges. A transform must request at least one dimension.
    pub fn validate(&self) -> Result<()> {
        if self.width.is_none() && self.height.is_none() {
            return Err(Error::InvalidTransform(
                "at least one of width/height is required".to_string(),
            ));
        }
        if let Some(q) = self.quality {
            if q == 0 || q > 100 {
                return Err(Error::InvalidQuality(q));
            }
        }
        Ok(())
    }
}
