//! On-disk result cache
//!
//! Renditions are stored as plain files named by their [`CacheKey`]. Reads
//! check the file's mtime against the route's [`CachePolicy`]; expired
//! entries count as misses and are removed in the background. Writes go
//! through a bounded [`CacheWriter`] pool so a response never waits on disk.
//! There is no locking: concurrent regenerations of one key both write and
//! the last rename wins.

pub mod backend;
pub mod error;
pub mod key;
pub mod mock_backend;
pub mod result_cache;
pub mod tokio_backend;
pub mod writer;

pub use backend::DiskBackend;
pub use error::CacheError;
pub use key::CacheKey;
pub use mock_backend::MockDiskBackend;
pub use result_cache::{CacheLookup, CachePolicy, ResultCache};
pub use tokio_backend::TokioFsBackend;
pub use writer::CacheWriter;
