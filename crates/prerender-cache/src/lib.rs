//! Artifact cache for the prerender gateway.
//!
//! A cache key is the full reconstructed URL; the artifact format is part
//! of the storage location so the same URL can be cached as HTML, PDF and
//! screenshot at once. Three backends are provided:
//!
//! - `dummy` — caches nothing (the default),
//! - `disk` — local files, LZMA-compressed, TTL by file mtime,
//! - `s3` — any S3-compatible object store, raw payloads.

mod disk;
mod dummy;
mod error;
mod location;
mod s3;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use prerender_config::{CacheBackendKind, CacheConfig};

pub use disk::DiskCache;
pub use dummy::DummyCache;
pub use error::CacheError;
pub use s3::S3Cache;

/// A cache backend for rendered artifacts.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a cached artifact, or `None` on miss or expiry.
    async fn get(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store an artifact with the given time-to-live.
    async fn set(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
        format: &str,
    ) -> Result<(), CacheError>;

    /// When the cached artifact was last written, or `None` if absent.
    async fn modified_since(
        &self,
        key: &str,
        format: &str,
    ) -> Result<Option<SystemTime>, CacheError>;
}

/// Build the backend selected by `CACHE_BACKEND`.
pub fn from_config(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, CacheError> {
    match config.backend {
        CacheBackendKind::Dummy => Ok(Arc::new(DummyCache)),
        CacheBackendKind::Disk => Ok(Arc::new(DiskCache::new(config.root_dir.clone()))),
        CacheBackendKind::S3 => Ok(Arc::new(S3Cache::new(&config.s3)?)),
    }
}
