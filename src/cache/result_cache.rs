//! TTL-checked result cache over a disk backend

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::backend::DiskBackend;
use super::key::CacheKey;
use super::writer::CacheWriter;

/// Per-route cache lifetime, from the configured `cache_time` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Negative `cache_time`: never read or write the cache
    Disabled,
    /// `cache_time == 0`: entries never expire
    Forever,
    Ttl(Duration),
}

impl CachePolicy {
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s < 0 => CachePolicy::Disabled,
            0 => CachePolicy::Forever,
            s => CachePolicy::Ttl(Duration::from_secs(s as u64)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, CachePolicy::Disabled)
    }

    /// True when an entry of this age must not be served
    pub fn is_expired(&self, age: Duration) -> bool {
        match self {
            CachePolicy::Disabled => true,
            CachePolicy::Forever => false,
            CachePolicy::Ttl(ttl) => age >= *ttl,
        }
    }
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Bytes),
    Miss,
}

/// Disk-backed rendition cache.
///
/// Reads happen inline; fills and stale deletions go through the bounded
/// [`CacheWriter`] and are never awaited by the request.
pub struct ResultCache {
    backend: Arc<dyn DiskBackend>,
    writer: CacheWriter,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn DiskBackend>, workers: usize, queue_depth: usize) -> Self {
        let writer = CacheWriter::new(Arc::clone(&backend), workers, queue_depth);
        Self { backend, writer }
    }

    pub async fn lookup(&self, key: &CacheKey, policy: CachePolicy) -> CacheLookup {
        if !policy.is_enabled() {
            return CacheLookup::Miss;
        }

        let path = key.to_path();
        let modified = match self.backend.modified(&path).await {
            Ok(modified) => modified,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(cache_key = %key, error = %e, "Failed to stat cache entry");
                }
                return CacheLookup::Miss;
            }
        };

        // An mtime in the future counts as fresh
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if policy.is_expired(age) {
            debug!(cache_key = %key, age_secs = age.as_secs(), "Cache entry expired");
            if let Err(e) = self.writer.delete(path) {
                warn!(cache_key = %key, error = %e, "Failed to schedule stale entry removal");
            }
            return CacheLookup::Miss;
        }

        match self.backend.read_file(&path).await {
            Ok(data) => CacheLookup::Hit(data),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(cache_key = %key, error = %e, "Failed to read cache entry");
                }
                CacheLookup::Miss
            }
        }
    }

    /// Fire-and-forget cache fill
    pub fn store(&self, key: &CacheKey, data: Bytes) {
        if let Err(e) = self.writer.write(key.to_path(), data) {
            warn!(cache_key = %key, error = %e, "Dropped cache write");
        }
    }

    pub fn writer(&self) -> &CacheWriter {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::mock_backend::MockDiskBackend;
    use crate::transform::TransformSpec;
    use std::path::Path;

    fn key(name: &str) -> CacheKey {
        CacheKey::new("/cache", "images", &TransformSpec::default(), name)
    }

    fn cache(backend: &MockDiskBackend) -> ResultCache {
        ResultCache::new(Arc::new(backend.clone()), 1, 8)
    }

    #[test]
    fn test_policy_from_secs() {
        assert_eq!(CachePolicy::from_secs(-1), CachePolicy::Disabled);
        assert_eq!(CachePolicy::from_secs(0), CachePolicy::Forever);
        assert_eq!(
            CachePolicy::from_secs(60),
            CachePolicy::Ttl(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_policy_expiry_boundary() {
        let policy = CachePolicy::from_secs(60);
        assert!(!policy.is_expired(Duration::from_secs(59)));
        assert!(policy.is_expired(Duration::from_secs(60)));
        assert!(!CachePolicy::Forever.is_expired(Duration::from_secs(u32::MAX as u64)));
    }

    #[tokio::test]
    async fn test_fresh_entry_hits() {
        let backend = MockDiskBackend::new();
        let k = key("/a.jpg");
        backend.insert(k.to_path(), "cached", SystemTime::now());

        let cache = cache(&backend);
        match cache.lookup(&k, CachePolicy::from_secs(60)).await {
            CacheLookup::Hit(data) => assert_eq!(data, "cached"),
            CacheLookup::Miss => panic!("expected hit"),
        }
    }

    #[tokio::test]
    async fn test_stale_entry_misses_and_is_removed() {
        let backend = MockDiskBackend::new();
        let k = key("/a.jpg");
        backend.insert(
            k.to_path(),
            "cached",
            SystemTime::now() - Duration::from_secs(120),
        );

        let cache = cache(&backend);
        assert!(matches!(
            cache.lookup(&k, CachePolicy::from_secs(60)).await,
            CacheLookup::Miss
        ));
        cache.writer().wait_idle().await;
        assert!(!backend.contains(&k.to_path()));
    }

    #[tokio::test]
    async fn test_forever_policy_ignores_age() {
        let backend = MockDiskBackend::new();
        let k = key("/a.jpg");
        backend.insert(
            k.to_path(),
            "cached",
            SystemTime::now() - Duration::from_secs(10 * 365 * 86_400),
        );

        let cache = cache(&backend);
        assert!(matches!(
            cache.lookup(&k, CachePolicy::Forever).await,
            CacheLookup::Hit(_)
        ));
    }

    #[tokio::test]
    async fn test_disabled_policy_never_hits() {
        let backend = MockDiskBackend::new();
        let k = key("/a.jpg");
        backend.insert(k.to_path(), "cached", SystemTime::now());

        let cache = cache(&backend);
        assert!(matches!(
            cache.lookup(&k, CachePolicy::Disabled).await,
            CacheLookup::Miss
        ));
        assert!(backend.contains(&k.to_path()));
    }

    #[tokio::test]
    async fn test_missing_entry_misses() {
        let backend = MockDiskBackend::new();
        let cache = cache(&backend);
        assert!(matches!(
            cache.lookup(&key("/nope.jpg"), CachePolicy::Forever).await,
            CacheLookup::Miss
        ));
    }

    #[tokio::test]
    async fn test_store_is_async() {
        let backend = MockDiskBackend::new();
        let cache = cache(&backend);
        let k = key("/b.jpg");

        cache.store(&k, Bytes::from_static(b"rendition"));
        cache.writer().wait_idle().await;
        assert!(backend.contains(Path::new(k.as_str())));
    }
}
