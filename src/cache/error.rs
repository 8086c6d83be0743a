//! Error types for result cache operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage full: cannot store entry")]
    StorageFull,

    #[error("Cache writer queue is full")]
    QueueFull,

    #[error("Cache writer is shut down")]
    Closed,
}

impl CacheError {
    /// True when the entry simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
