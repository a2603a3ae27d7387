//! Interactive source-image editing.
//!
//! An [`EditSession`] holds a decoded copy of the source image and applies
//! destructive operations in memory. Nothing touches storage until
//! [`finish`](EditSession::finish) encodes the result to a temp file the
//! caller uploads as a new asset revision; [`cancel`](EditSession::cancel)
//! drops everything.

use crate::error::{TransformError, TransformResult};
use crate::raster;
use darkroom_core::ImageFormat;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;

/// An in-memory editing session over one decoded source image.
pub struct EditSession {
    image: DynamicImage,
    format: ImageFormat,
}

impl EditSession {
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self { image, format }
    }

    pub fn width(&self) -> u32 {
        self.image.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.image.dimensions().1
    }

    /// Output format the session encodes to on finish.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn flip(&mut self, horizontal: bool, vertical: bool) {
        if horizontal {
            self.image = self.image.fliph();
        }
        if vertical {
            self.image = self.image.flipv();
        }
    }

    /// Rotate clockwise in quarter turns.
    pub fn rotate(&mut self, quarter_turns: u32) {
        match quarter_turns % 4 {
            1 => self.image = self.image.rotate90(),
            2 => self.image = self.image.rotate180(),
            3 => self.image = self.image.rotate270(),
            _ => {}
        }
    }

    /// Crop to the given window. The window must lie within the image.
    pub fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) -> TransformResult<()> {
        let (w, h) = self.image.dimensions();
        if width == 0
            || height == 0
            || x.checked_add(width).map(|r| r > w).unwrap_or(true)
            || y.checked_add(height).map(|b| b > h).unwrap_or(true)
        {
            return Err(TransformError::Raster(format!(
                "crop window {width}x{height}+{x}+{y} exceeds image {w}x{h}"
            )));
        }
        self.image = self.image.crop_imm(x, y, width, height);
        Ok(())
    }

    /// Scale down to fit within the given bounds, preserving aspect ratio.
    pub fn scale_to_fit(&mut self, width: u32, height: u32) {
        self.image = self
            .image
            .resize(width.max(1), height.max(1), FilterType::Lanczos3);
    }

    /// Encode the edited image to a temp file and return its path. The
    /// caller owns the file.
    pub fn finish(self) -> TransformResult<PathBuf> {
        let temp = tempfile::Builder::new()
            .prefix("darkroom-edit-")
            .suffix(&format!(".{}", self.format))
            .tempfile()
            .map_err(|e| TransformError::Raster(format!("temp file: {e}")))?
            .into_temp_path();
        raster::encode_to_path(&self.image, self.format, None, &temp)?;
        // Hand ownership to the caller instead of deleting on drop.
        temp.keep()
            .map_err(|e| TransformError::Raster(format!("persist temp file: {e}")))
    }

    /// Discard the session.
    pub fn cancel(self) {}
}
