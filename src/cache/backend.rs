//! Backend trait for filesystem operations

use super::error::CacheError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::SystemTime;

/// Abstraction over the filesystem calls the result cache needs
#[async_trait]
pub trait DiskBackend: Send + Sync {
    /// Read entire file contents
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError>;

    /// Write file contents atomically (temp file + rename), creating parents
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError>;

    /// Delete a file; deleting a missing file is not an error
    async fn delete_file(&self, path: &Path) -> Result<(), CacheError>;

    /// Last modification time
    async fn modified(&self, path: &Path) -> Result<SystemTime, CacheError>;
}
