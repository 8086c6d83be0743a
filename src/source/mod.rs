//! Image sources
//!
//! An [`ImageSource`] turns a logical path into raw image bytes. Sources are
//! built by name from per-route JSON configuration through the
//! [`SourceRegistry`]:
//!
//! - `s3`: signed GET against an object store
//! - `s3_preview`: object-store fetch piped through an external renderer
//! - `social`: CDN URL templates tried in order

pub mod http;
pub mod preview;
pub mod registry;
pub mod s3;
pub mod social;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceFetchError;

pub use http::HttpClient;
pub use preview::{CommandRenderer, PreviewSource, PreviewSourceConfig, ThumbnailRenderer};
pub use registry::SourceRegistry;
pub use s3::{S3Source, S3SourceConfig};
pub use social::{SocialSource, SocialSourceConfig};

/// What a source is asked to fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Logical path after prefix stripping and rewriting, with leading `/`
    pub path: String,
    /// Cleaned request query without the `?` or the verification token
    pub query: String,
}

impl FetchRequest {
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }

    /// Last path segment
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// Capability to fetch raw bytes for a logical path
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, SourceFetchError>;
}
