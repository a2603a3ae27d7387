//! Pixel work: decoding, geometry, and encoding.

use crate::error::{TransformError, TransformResult};
use async_trait::async_trait;
use bytes::Bytes;
use darkroom_core::{FocalPoint, ImageFormat, Position, Transform, TransformMode};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Callback invoked around long raster operations so the caller can record
/// liveness (e.g. touch the index row or extend a job heartbeat). Must be
/// cheap and thread-safe.
pub type ProgressHook = Arc<dyn Fn() + Send + Sync>;

/// Raster engine boundary: turns source bytes into an encoded artifact on
/// local disk.
#[async_trait]
pub trait RasterEngine: Send + Sync {
    /// Render `source` according to `transform` and encode it as `format`
    /// into the file at `output`. `progress`, when given, is invoked around
    /// the long stages.
    async fn transform_image(
        &self,
        source: Bytes,
        transform: &Transform,
        focal_point: Option<FocalPoint>,
        format: ImageFormat,
        output: &Path,
        progress: Option<ProgressHook>,
    ) -> TransformResult<()>;
}

/// Raster engine backed by the `image` crate. Decode, geometry, and encode
/// all run on the blocking thread pool.
#[derive(Default)]
pub struct ImageRsEngine;

impl ImageRsEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RasterEngine for ImageRsEngine {
    #[instrument(skip(self, source, transform, focal_point, progress), fields(bytes = source.len(), %format))]
    async fn transform_image(
        &self,
        source: Bytes,
        transform: &Transform,
        focal_point: Option<FocalPoint>,
        format: ImageFormat,
        output: &Path,
        progress: Option<ProgressHook>,
    ) -> TransformResult<()> {
        let transform = transform.clone();
        let output: PathBuf = output.to_path_buf();

        tokio::task::spawn_blocking(move || {
            if let Some(hook) = &progress {
                hook();
            }
            let img = decode(&source)?;
            let rendered = render(img, &transform, focal_point);
            encode_to_path(&rendered, format, transform.quality, &output)?;
            if let Some(hook) = &progress {
                hook();
            }
            Ok(())
        })
        .await
        .map_err(|e| TransformError::Raster(format!("raster task panicked: {e}")))?
    }
}

/// Decode source bytes into a raster image.
pub(crate) fn decode(bytes: &[u8]) -> TransformResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| TransformError::Raster(format!("decode: {e}")))
}

/// Apply the transform's geometry to a decoded image.
pub(crate) fn render(
    img: DynamicImage,
    transform: &Transform,
    focal_point: Option<FocalPoint>,
) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let (target_w, target_h) = target_dimensions(transform, src_w, src_h);

    match transform.mode {
        TransformMode::Crop => cover_crop(img, target_w, target_h, transform.position, focal_point),
        TransformMode::Fit => img.resize(target_w, target_h, FilterType::Lanczos3),
        TransformMode::Stretch => img.resize_exact(target_w, target_h, FilterType::Lanczos3),
        TransformMode::Letterbox => letterbox(img, target_w, target_h),
    }
}

/// Resolve AUTO dimensions against the source aspect ratio.
fn target_dimensions(transform: &Transform, src_w: u32, src_h: u32) -> (u32, u32) {
    let aspect = src_w.max(1) as f64 / src_h.max(1) as f64;
    match (transform.width, transform.height) {
        (Some(w), Some(h)) => (w.max(1), h.max(1)),
        (Some(w), None) => (w.max(1), ((w.max(1) as f64 / aspect).round() as u32).max(1)),
        (None, Some(h)) => (((h.max(1) as f64 * aspect).round() as u32).max(1), h.max(1)),
        // Unreachable for validated transforms.
        (None, None) => (src_w, src_h),
    }
}

/// Anchor fractions for a crop position.
fn anchor(position: Position) -> (f64, f64) {
    let x = match position {
        Position::TopLeft | Position::CenterLeft | Position::BottomLeft => 0.0,
        Position::TopCenter | Position::CenterCenter | Position::BottomCenter => 0.5,
        Position::TopRight | Position::CenterRight | Position::BottomRight => 1.0,
    };
    let y = match position {
        Position::TopLeft | Position::TopCenter | Position::TopRight => 0.0,
        Position::CenterLeft | Position::CenterCenter | Position::CenterRight => 0.5,
        Position::BottomLeft | Position::BottomCenter | Position::BottomRight => 1.0,
    };
    (x, y)
}

/// Scale so the image covers the target box, then crop at the focal point
/// (or the position anchor when none is set).
fn cover_crop(
    img: DynamicImage,
    target_w: u32,
    target_h: u32,
    position: Position,
    focal_point: Option<FocalPoint>,
) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let scale = f64::max(
        target_w as f64 / src_w.max(1) as f64,
        target_h as f64 / src_h.max(1) as f64,
    );
    let scaled_w = ((src_w as f64 * scale).round() as u32).max(target_w);
    let scaled_h = ((src_h as f64 * scale).round() as u32).max(target_h);
    let resized = img.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3);

    let (fx, fy) = match focal_point {
        Some(fp) => (fp.x.clamp(0.0, 1.0), fp.y.clamp(0.0, 1.0)),
        None => anchor(position),
    };
    let x = ((scaled_w - target_w) as f64 * fx).round() as u32;
    let y = ((scaled_h - target_h) as f64 * fy).round() as u32;
    resized.crop_imm(x, y, target_w, target_h)
}

/// Scale to fit, then pad onto a white canvas of exactly the target size.
fn letterbox(img: DynamicImage, target_w: u32, target_h: u32) -> DynamicImage {
    let fitted = img.resize(target_w, target_h, FilterType::Lanczos3);
    let (fit_w, fit_h) = fitted.dimensions();
    let mut canvas =
        image::RgbaImage::from_pixel(target_w, target_h, Rgba([255, 255, 255, 255]));
    let x = i64::from((target_w - fit_w.min(target_w)) / 2);
    let y = i64::from((target_h - fit_h.min(target_h)) / 2);
    image::imageops::overlay(&mut canvas, &fitted.to_rgba8(), x, y);
    DynamicImage::ImageRgba8(canvas)
}

/// Encode an image to a file in the requested format.
///
/// Interlace settings are accepted for fingerprinting but the encoders here
/// always produce baseline output.
pub(crate) fn encode_to_path(
    img: &DynamicImage,
    format: ImageFormat,
    quality: Option<u32>,
    path: &Path,
) -> TransformResult<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| TransformError::Raster(format!("create {}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    let encode_err = |e: image::ImageError| TransformError::Raster(format!("encode: {e}"));

    match format {
        ImageFormat::Jpg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            let quality = quality.unwrap_or(82).clamp(1, 100) as u8;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality);
            rgb.write_with_encoder(encoder).map_err(encode_err)?;
        }
        ImageFormat::Png => {
            img.write_with_encoder(image::codecs::png::PngEncoder::new(&mut writer))
                .map_err(encode_err)?;
        }
        ImageFormat::Gif => {
            let mut encoder = image::codecs::gif::GifEncoder::new(&mut writer);
            encoder
                .encode_frame(image::Frame::new(img.to_rgba8()))
                .map_err(encode_err)?;
        }
        ImageFormat::Webp => {
            img.write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(&mut writer))
                .map_err(encode_err)?;
        }
        ImageFormat::Avif => {
            return Err(TransformError::Raster(
                "avif encoding is not supported by this engine".to_string(),
            ));
        }
    }

    writer
        .flush()
        .map_err(|e| TransformError::Raster(format!("flush {}: {e}", path.display())))?;
    Ok(())
}
