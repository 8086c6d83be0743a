//! Cache key derivation
//!
//! A key is the full path of the cached rendition:
//!
//! ```text
//! {cache_path}/{prefix}_w{w}_h{h}_c{crop}_q{quality}_b{blur}_i{interlaced}_{name}{ext}
//! ```
//!
//! `name` is the percent-encoded logical path, source extension included, so
//! distinct files never share a key (`/a/bc.jpg` and `/ab/c.jpg` encode to
//! `%2Fa%2Fbc.jpg` and `%2Fab%2Fc.jpg`). It always starts with `%2F`, which
//! keeps it apart from the modifier group. Non-default modifiers are appended
//! after the interlace flag (`_fc` for feature crop, `_e0` when enlarging is
//! off, `_px{n}` for pixelation) so they also change the key.

use std::fmt;
use std::path::PathBuf;

use crate::transform::TransformSpec;

/// Deterministic identifier of one cached rendition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(cache_path: &str, route_prefix: &str, spec: &TransformSpec, filename: &str) -> Self {
        let name = if filename.starts_with('/') {
            urlencoding::encode(filename).into_owned()
        } else {
            urlencoding::encode(&format!("/{}", filename)).into_owned()
        };

        let mut modifiers = String::new();
        if spec.feature_crop {
            modifiers.push_str("_fc");
        }
        if !spec.enlarge {
            modifiers.push_str("_e0");
        }
        if spec.pixelation > 1 {
            modifiers.push_str(&format!("_px{}", spec.pixelation));
        }

        CacheKey(format!(
            "{}/{}_w{}_h{}_c{}_q{}_b{}_i{}{}_{}{}",
            cache_path.trim_end_matches('/'),
            route_prefix,
            spec.width,
            spec.height,
            spec.crop,
            spec.quality,
            spec.blur,
            spec.interlaced,
            modifiers,
            name,
            spec.output_format.extension(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
