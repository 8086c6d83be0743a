//! Image transformation
//!
//! Resolves request parameters into a [`TransformSpec`] and applies it to
//! source bytes:
//! - Resize with center or feature-aware crop, or aspect-preserving fit
//! - Gaussian blur
//! - Block-averaging pixelation
//! - JPEG (baseline or progressive), PNG and lossy WebP output
//!
//! # Query Parameters
//!
//! ```text
//! /images/photo.jpg?w=800&h=600&c=1&fc=0&e=1&i=1&q=80&p=w&b=1.5&px=10&f=webp
//! ```

pub mod encoder;
pub mod error;
pub mod feature_crop;
pub mod params;
pub mod pixelate;
pub mod processor;
pub mod resolver;

pub use encoder::{EncodedImage, EncoderFactory, EncoderQuality, ImageEncoder};
pub use error::TransformError;
pub use params::{OutputFormat, RouteDefaults, TransformSpec};
pub use processor::{ProcessedImage, TransformEngine};
pub use resolver::resolve;
