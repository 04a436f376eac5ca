//! Backend that caches nothing.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::{CacheBackend, CacheError};

/// The default backend: every lookup is a miss, every write a no-op.
pub struct DummyCache;

#[async_trait]
impl CacheBackend for DummyCache {
    async fn get(&self, _key: &str, _format: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &str,
        _payload: &[u8],
        _ttl: Duration,
        _format: &str,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn modified_since(
        &self,
        _key: &str,
        _format: &str,
    ) -> Result<Option<SystemTime>, CacheError> {
        Ok(None)
    }
}
