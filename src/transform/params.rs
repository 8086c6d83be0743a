//! Transform parameter types
//!
//! A [`TransformSpec`] is the fully resolved set of options for one
//! rendition. It is produced from request query parameters and the route's
//! [`RouteDefaults`] by [`super::resolve`].

use std::fmt;
use std::str::FromStr;

use super::error::TransformError;

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// File extension including the leading dot, as used in cache file names
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::WebP => ".webp",
        }
    }

    /// Recognize a format from an extension or short name (`jpg`, `.webp`, ...)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.');
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| TransformError::unsupported_format(s))
    }
}

/// Per-route defaults applied when a request leaves an option out
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDefaults {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub dont_crop: bool,
    pub feature_crop: bool,
    /// Quality used for the `p=w` (wifi) profile
    pub wifi_quality: Option<u8>,
    pub output_format: Option<OutputFormat>,
}

impl Default for RouteDefaults {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            quality: crate::constants::DEFAULT_QUALITY,
            dont_crop: false,
            feature_crop: false,
            wifi_quality: None,
            output_format: None,
        }
    }
}

/// Resolved transform options for one request
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    /// Target width, 0 means "derive from height"
    pub width: u32,
    pub height: u32,
    /// The request gave no usable width
    pub width_missing: bool,
    pub height_missing: bool,
    pub crop: bool,
    pub feature_crop: bool,
    pub enlarge: bool,
    pub interlaced: bool,
    /// 1..=100
    pub quality: u8,
    /// Gaussian sigma, 0 disables
    pub blur: f32,
    /// Block size as a percentage of the width, 0..=100
    pub pixelation: u8,
    pub output_format: OutputFormat,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            width_missing: true,
            height_missing: true,
            crop: true,
            feature_crop: false,
            enlarge: true,
            interlaced: true,
            quality: crate::constants::DEFAULT_QUALITY,
            blur: 0.0,
            pixelation: 0,
            output_format: OutputFormat::Jpeg,
        }
    }
}

impl TransformSpec {
    /// True when no resize is requested at all
    pub fn keeps_dimensions(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}
