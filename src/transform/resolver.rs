//! Query parameter resolution
//!
//! Turns request query parameters plus route defaults into a [`TransformSpec`].
//! Resolution never fails: unparsable values fall back to the default for
//! that field. Override order for quality is route default, then the `p`
//! profile, then an explicit `q`.

use std::collections::HashMap;

use super::params::{OutputFormat, RouteDefaults, TransformSpec};
use crate::constants::{MAX_BLUR, MAX_DIMENSION, MAX_PIXELATION};

/// Resolve the transform for one request
pub fn resolve(params: &HashMap<String, String>, defaults: &RouteDefaults) -> TransformSpec {
    let (width, width_missing) = dimension(param(params, "w"), defaults.width);
    let (height, height_missing) = dimension(param(params, "h"), defaults.height);

    let crop = param(params, "c")
        .map(parse_bool)
        .unwrap_or(!defaults.dont_crop);
    let feature_crop = crop
        && param(params, "fc")
            .map(parse_bool)
            .unwrap_or(defaults.feature_crop);
    let enlarge = param(params, "e").map(parse_bool).unwrap_or(true);
    let interlaced = param(params, "i").map(parse_bool).unwrap_or(true);

    TransformSpec {
        width,
        height,
        width_missing,
        height_missing,
        crop,
        feature_crop,
        enlarge,
        interlaced,
        quality: quality(params, defaults),
        blur: blur(param(params, "b")),
        pixelation: pixelation(param(params, "px")),
        output_format: param(params, "f")
            .and_then(OutputFormat::from_extension)
            .or(defaults.output_format)
            .unwrap_or(OutputFormat::Jpeg),
    }
}

/// A parameter counts as present only when it is non-empty
fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Lenient number parsing: anything unparsable is 0
fn parse_number(value: &str) -> f64 {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "y" | "yes" | "on"
    )
}

/// Returns the clamped dimension and whether the default was substituted
fn dimension(value: Option<&str>, default: u32) -> (u32, bool) {
    let requested = value.map(parse_number).unwrap_or(0.0);
    if requested >= 1.0 {
        (requested.min(MAX_DIMENSION as f64) as u32, false)
    } else {
        (default.min(MAX_DIMENSION), true)
    }
}

fn quality(params: &HashMap<String, String>, defaults: &RouteDefaults) -> u8 {
    let mut quality = defaults.quality.clamp(1, 100);

    if param(params, "p") == Some("w") {
        if let Some(wifi) = defaults.wifi_quality.filter(|q| *q > 0) {
            quality = wifi.min(100);
        }
    }

    if let Some(explicit) = param(params, "q").map(parse_number) {
        if explicit >= 1.0 {
            quality = explicit.min(100.0) as u8;
        }
    }

    quality
}

fn blur(value: Option<&str>) -> f32 {
    let amount = value.map(parse_number).unwrap_or(0.0);
    if amount > 0.0 {
        (amount as f32).min(MAX_BLUR)
    } else {
        0.0
    }
}

fn pixelation(value: Option<&str>) -> u8 {
    value
        .map(parse_number)
        .map(|p| p.clamp(0.0, MAX_PIXELATION as f64) as u8)
        .unwrap_or(0)
}
