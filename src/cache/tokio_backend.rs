//! Tokio-based filesystem backend

use super::backend::DiskBackend;
use super::error::CacheError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::time::SystemTime;
use uuid::Uuid;

/// Portable filesystem backend using tokio::fs
#[derive(Debug, Default, Clone)]
pub struct TokioFsBackend;

impl TokioFsBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiskBackend for TokioFsBackend {
    async fn read_file(&self, path: &Path) -> Result<Bytes, CacheError> {
        let data = tokio::fs::read(path).await?;
        Ok(Bytes::from(data))
    }

    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Unique temp name: concurrent writers of one key must not share it
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let temp_path = path.with_file_name(temp_name);

        if let Err(e) = tokio::fs::write(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<(), CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime, CacheError> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(metadata.modified()?)
    }
}
