//! Local disk backend with LZMA-compressed payloads.
//!
//! Expiry is tracked with the payload file's mtime plus a TTL sidecar
//! written at store time; expired entries are removed on the read path.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::debug;

use crate::location::object_path;
use crate::{CacheBackend, CacheError};

pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn payload_path(&self, key: &str, format: &str) -> PathBuf {
        self.root.join(object_path(key, format))
    }

    fn ttl_path(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_owned();
        os.push(".ttl");
        PathBuf::from(os)
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.payload_path(key, format);
        tokio::task::spawn_blocking(move || read_entry(&path)).await?
    }

    async fn set(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
        format: &str,
    ) -> Result<(), CacheError> {
        let path = self.payload_path(key, format);
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || write_entry(&path, &payload, ttl)).await?
    }

    async fn modified_since(
        &self,
        key: &str,
        format: &str,
    ) -> Result<Option<SystemTime>, CacheError> {
        let path = self.payload_path(key, format);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_entry(path: &Path, payload: &[u8], ttl: Duration) -> Result<(), CacheError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut compressed = Vec::new();
    lzma_rs::lzma_compress(&mut &payload[..], &mut compressed)?;
    std::fs::write(path, &compressed)?;
    std::fs::write(DiskCache::ttl_path(path), ttl.as_secs().to_string())?;
    debug!(path = %path.display(), bytes = compressed.len(), "cache entry written");
    Ok(())
}

fn read_entry(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let ttl = std::fs::read_to_string(DiskCache::ttl_path(path))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs);
    if let (Some(ttl), Ok(modified)) = (ttl, meta.modified()) {
        let expired = modified
            .elapsed()
            .map(|elapsed| elapsed > ttl)
            .unwrap_or(false);
        if expired {
            let _ = std::fs::remove_file(path);
            let _ = std::fs::remove_file(DiskCache::ttl_path(path));
            return Ok(None);
        }
    }

    let compressed = std::fs::read(path)?;
    let mut payload = Vec::new();
    lzma_rs::lzma_decompress(&mut &compressed[..], &mut payload)?;
    Ok(Some(payload))
}
