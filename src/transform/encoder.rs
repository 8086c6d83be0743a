//! Image encoder abstraction
//!
//! Every encoder takes raw RGBA pixels and produces the bytes of one output
//! format. [`EncoderFactory`] picks the encoder for a resolved
//! [`OutputFormat`] and interlace hint.

use super::error::TransformError;
use super::params::OutputFormat;

/// Quality settings for image encoding
#[derive(Debug, Clone, Copy)]
pub struct EncoderQuality {
    /// Quality value (1-100, where 100 is best quality)
    pub quality: u8,
}

impl Default for EncoderQuality {
    fn default() -> Self {
        Self {
            quality: crate::constants::DEFAULT_QUALITY,
        }
    }
}

impl EncoderQuality {
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

/// Result of encoding an image
#[derive(Debug)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: OutputFormat,
    /// Content-Type header value
    pub content_type: &'static str,
}

impl EncodedImage {
    pub fn new(data: Vec<u8>, format: OutputFormat) -> Self {
        let content_type = format.content_type();
        Self {
            data,
            format,
            content_type,
        }
    }
}

/// Trait for image encoders
///
/// The trait is object-safe so the factory can hand out boxed encoders.
pub trait ImageEncoder: Send + Sync {
    /// The output format this encoder produces
    fn format(&self) -> OutputFormat;

    /// Encode raw RGBA image data (4 bytes per pixel)
    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: EncoderQuality,
    ) -> Result<EncodedImage, TransformError>;

    fn supports_transparency(&self) -> bool;
}

/// JPEG encoder
///
/// Progressive output goes through mozjpeg; baseline output uses the image
/// crate's encoder.
pub struct JpegEncoder {
    pub progressive: bool,
}

impl ImageEncoder for JpegEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: EncoderQuality,
    ) -> Result<EncodedImage, TransformError> {
        // JPEG has no alpha channel
        let rgb_data = rgba_to_rgb(data);

        let encoded = if self.progressive {
            encode_progressive_jpeg(&rgb_data, width, height, quality.quality)?
        } else {
            encode_baseline_jpeg(&rgb_data, width, height, quality.quality)?
        };

        Ok(EncodedImage::new(encoded, OutputFormat::Jpeg))
    }

    fn supports_transparency(&self) -> bool {
        false
    }
}

fn encode_baseline_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
    use image::ImageEncoder as _;
    use std::io::Cursor;

    let mut output = Cursor::new(Vec::new());
    ImageJpegEncoder::new_with_quality(&mut output, quality)
        .write_image(rgb, width, height, image::ColorType::Rgb8)
        .map_err(|e| TransformError::encode_failed("jpeg", e.to_string()))?;

    Ok(output.into_inner())
}

fn encode_progressive_jpeg(
    rgb: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, TransformError> {
    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| TransformError::encode_failed("jpeg", e.to_string()))?;
    comp.write_scanlines(rgb)
        .map_err(|e| TransformError::encode_failed("jpeg", e.to_string()))?;
    comp.finish()
        .map_err(|e| TransformError::encode_failed("jpeg", e.to_string()))
}

/// PNG encoder using the image crate
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        _quality: EncoderQuality,
    ) -> Result<EncodedImage, TransformError> {
        use image::codecs::png::PngEncoder as ImagePngEncoder;
        use image::ImageEncoder as _;
        use std::io::Cursor;

        let mut output = Cursor::new(Vec::new());
        let encoder = ImagePngEncoder::new(&mut output);

        encoder
            .write_image(data, width, height, image::ColorType::Rgba8)
            .map_err(|e| TransformError::encode_failed("png", e.to_string()))?;

        Ok(EncodedImage::new(output.into_inner(), OutputFormat::Png))
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Lossy WebP encoder using libwebp
pub struct WebPEncoder;

impl ImageEncoder for WebPEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::WebP
    }

    fn encode(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        quality: EncoderQuality,
    ) -> Result<EncodedImage, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::encode_failed("webp", "zero-sized image"));
        }

        let encoder = webp::Encoder::from_rgba(data, width, height);
        let encoded = encoder.encode(quality.quality as f32);

        Ok(EncodedImage::new(encoded.to_vec(), OutputFormat::WebP))
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Factory for creating encoders based on output format
pub struct EncoderFactory;

impl EncoderFactory {
    /// `interlaced` only affects formats with a progressive mode (JPEG)
    pub fn create(format: OutputFormat, interlaced: bool) -> Box<dyn ImageEncoder> {
        match format {
            OutputFormat::Jpeg => Box::new(JpegEncoder {
                progressive: interlaced,
            }),
            OutputFormat::Png => Box::new(PngEncoder),
            OutputFormat::WebP => Box::new(WebPEncoder),
        }
    }
}

/// Convert RGBA to RGB by discarding alpha channel
fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for chunk in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&chunk[..3]);
    }
    rgb
}
