//! Mock disk backend for testing (in-memory HashMap storage)

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::backend::DiskBackend;
use super::error::CacheError;

/// Mock backend that stores files in memory, with controllable mtimes
#[derive(Clone, Default)]
pub struct MockDiskBackend {
    files: Arc<RwLock<HashMap<PathBuf, (Bytes, SystemTime)>>>,
    /// Simulate errors if true
    simulate_storage_full: Arc<RwLock<bool>>,
}

impl MockDiskBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable storage full simulation for testing
    pub fn set_storage_full(&self, enabled: bool) {
        *self.simulate_storage_full.write() = enabled;
    }

    /// Insert a file with an explicit modification time
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Bytes>, modified: SystemTime) {
        self.files.write().insert(path.into(), (data.into(), modified));
    }

    /// Backdate or postdate an existing file
    pub fn set_modified(&self, path: &Path, modified: SystemTime) {
        if let Some(entry) = self.files.write().get_mut(path) {
            entry.1 = modified;
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    /// Get number of stored files
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }
}

fn not_found() -> CacheError {
    CacheError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "File not found",
    ))
}

#[async_trait]
impl DiskBackend for MockDiskBackend {
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError> {
        self.files
            .read()
            .get(path)
            .map(|(data, _)| data.clone())
            .ok_or_else(not_found)
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError> {
        if *self.simulate_storage_full.read() {
            return Err(CacheError::StorageFull);
        }
        self.files
            .write()
            .insert(path.to_path_buf(), (data, SystemTime::now()));
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), CacheError> {
        self.files.write().remove(path);
        Ok(())
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, CacheError> {
        self.files
            .read()
            .get(path)
            .map(|(_, modified)| *modified)
            .ok_or_else(not_found)
    }
}
