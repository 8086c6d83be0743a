//! Image processing implementation
//!
//! Handles the actual transformation: decode → resize/crop → blur →
//! pixelate → encode

use bytes::Bytes;
use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::io::Reader as ImageReader;
use image::DynamicImage;
use std::io::Cursor;
use std::num::NonZeroU32;

use super::encoder::{EncoderFactory, EncoderQuality};
use super::error::TransformError;
use super::feature_crop;
use super::params::{OutputFormat, TransformSpec};
use super::pixelate::pixelate;
use crate::constants::MIN_PIXELATE_SOURCE_BYTES;

/// Result of image processing
#[derive(Debug)]
pub struct ProcessedImage {
    /// The encoded image data
    pub data: Vec<u8>,
    pub format: OutputFormat,
    /// Content-Type header value
    pub content_type: &'static str,
    /// Original dimensions (width, height)
    pub original_size: (u32, u32),
    /// Output dimensions (width, height)
    pub output_size: (u32, u32),
}

/// Applies a [`TransformSpec`] to raw source bytes.
///
/// The engine is stateless and cheap to clone. [`TransformEngine::apply`] is
/// CPU-bound; async callers should go through
/// [`TransformEngine::apply_blocking`].
#[derive(Debug, Clone)]
pub struct TransformEngine {
    /// Pixelation only runs for sources larger than this
    min_pixelate_bytes: usize,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self {
            min_pixelate_bytes: MIN_PIXELATE_SOURCE_BYTES,
        }
    }
}

impl TransformEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, raw: &[u8], spec: &TransformSpec) -> Result<ProcessedImage, TransformError> {
        // 1. Decode the image
        let img = decode_image(raw)?;
        let original_size = (img.width(), img.height());

        // 2. Resize and crop
        let mut img = resize_to_spec(img, spec)?;

        // 3. Blur
        if spec.blur > 0.0 {
            img = img.blur(spec.blur);
        }

        // 4. Pixelate
        if spec.pixelation > 1 && raw.len() > self.min_pixelate_bytes {
            img = DynamicImage::ImageRgba8(pixelate(&img.to_rgba8(), spec.pixelation));
        }

        // 5. Encode
        let (width, height) = (img.width(), img.height());
        let encoder = EncoderFactory::create(spec.output_format, spec.interlaced);
        let rgba = img.to_rgba8();
        let encoded = encoder.encode(
            rgba.as_raw(),
            width,
            height,
            EncoderQuality::with_quality(spec.quality),
        )?;

        Ok(ProcessedImage {
            data: encoded.data,
            format: encoded.format,
            content_type: encoded.content_type,
            original_size,
            output_size: (width, height),
        })
    }

    /// Run [`TransformEngine::apply`] on tokio's blocking pool
    pub async fn apply_blocking(
        &self,
        raw: Bytes,
        spec: TransformSpec,
    ) -> Result<ProcessedImage, TransformError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.apply(&raw, &spec))
            .await
            .map_err(|e| TransformError::task_failed(e.to_string()))?
    }
}

/// Decode image data into a DynamicImage
fn decode_image(data: &[u8]) -> Result<DynamicImage, TransformError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TransformError::decode_failed(e.to_string()))?
        .decode()
        .map_err(|e| match e {
            image::ImageError::Unsupported(u) => TransformError::unsupported_format(u.to_string()),
            other => TransformError::decode_failed(other.to_string()),
        })
}

fn resize_to_spec(img: DynamicImage, spec: &TransformSpec) -> Result<DynamicImage, TransformError> {
    if spec.keeps_dimensions() {
        return Ok(img);
    }

    let (src_w, src_h) = (img.width(), img.height());

    if spec.crop && spec.width > 0 && spec.height > 0 {
        let (scaled_w, scaled_h) =
            cover_dimensions(src_w, src_h, spec.width, spec.height, spec.enlarge);
        let scaled = if (scaled_w, scaled_h) != (src_w, src_h) {
            resize_image(&img, scaled_w, scaled_h)?
        } else {
            img
        };

        let crop_w = spec.width.min(scaled_w);
        let crop_h = spec.height.min(scaled_h);
        if (crop_w, crop_h) == (scaled_w, scaled_h) {
            return Ok(scaled);
        }

        let (x, y) = if spec.feature_crop {
            feature_crop::crop_origin(&scaled, crop_w, crop_h)
        } else {
            ((scaled_w - crop_w) / 2, (scaled_h - crop_h) / 2)
        };
        return Ok(scaled.crop_imm(x, y, crop_w, crop_h));
    }

    let (target_w, target_h) = fit_dimensions(src_w, src_h, spec.width, spec.height, spec.enlarge);
    if (target_w, target_h) == (src_w, src_h) {
        return Ok(img);
    }
    resize_image(&img, target_w, target_h)
}

/// Smallest scale that covers the target box; the caller crops the overflow
fn cover_dimensions(src_w: u32, src_h: u32, width: u32, height: u32, enlarge: bool) -> (u32, u32) {
    let mut scale = (width as f64 / src_w as f64).max(height as f64 / src_h as f64);
    if !enlarge {
        scale = scale.min(1.0);
    }
    scale_dimensions(src_w, src_h, scale)
}

/// Largest scale that fits inside the target box; a zero side is unconstrained
fn fit_dimensions(src_w: u32, src_h: u32, width: u32, height: u32, enlarge: bool) -> (u32, u32) {
    let scale_x = if width > 0 {
        width as f64 / src_w as f64
    } else {
        f64::INFINITY
    };
    let scale_y = if height > 0 {
        height as f64 / src_h as f64
    } else {
        f64::INFINITY
    };
    let mut scale = scale_x.min(scale_y);
    if !enlarge {
        scale = scale.min(1.0);
    }
    scale_dimensions(src_w, src_h, scale)
}

fn scale_dimensions(src_w: u32, src_h: u32, scale: f64) -> (u32, u32) {
    let w = (src_w as f64 * scale).round().max(1.0) as u32;
    let h = (src_h as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

/// Resize image using fast-image-resize with Lanczos3 filter
fn resize_image(
    img: &DynamicImage,
    target_w: u32,
    target_h: u32,
) -> Result<DynamicImage, TransformError> {
    let src_width = NonZeroU32::new(img.width())
        .ok_or_else(|| TransformError::resize_failed("Source width is 0"))?;
    let src_height = NonZeroU32::new(img.height())
        .ok_or_else(|| TransformError::resize_failed("Source height is 0"))?;
    let dst_width = NonZeroU32::new(target_w)
        .ok_or_else(|| TransformError::resize_failed("Target width is 0"))?;
    let dst_height = NonZeroU32::new(target_h)
        .ok_or_else(|| TransformError::resize_failed("Target height is 0"))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        img.to_rgba8().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| TransformError::resize_failed(format!("Failed to create source image: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);
    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));

    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| TransformError::resize_failed(format!("Resize operation failed: {:?}", e)))?;

    let rgba_image = image::RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| TransformError::resize_failed("Failed to create output image buffer"))?;

    Ok(DynamicImage::ImageRgba8(rgba_image))
}
