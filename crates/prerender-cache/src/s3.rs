//! S3-compatible object storage backend.
//!
//! Payloads are stored raw; expiry is left to bucket lifecycle rules, so
//! the TTL passed to `set` is advisory here. Non-AWS endpoints are
//! addressed path-style over plain HTTP, matching how MinIO-style
//! deployments are usually exposed.

use std::time::{Duration, SystemTime};

use ::s3::creds::Credentials;
use ::s3::error::S3Error;
use ::s3::{Bucket, Region};
use async_trait::async_trait;
use tracing::debug;

use prerender_config::S3Config;

use crate::location::object_path;
use crate::{CacheBackend, CacheError};

pub struct S3Cache {
    bucket: Box<Bucket>,
}

impl S3Cache {
    pub fn new(config: &S3Config) -> Result<Self, CacheError> {
        let secure = config.server == "s3.amazonaws.com";
        let scheme = if secure { "https" } else { "http" };
        let region = Region::Custom {
            region: config.region.clone().unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: format!("{scheme}://{}", config.server),
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access), Some(secret), None, None, None)?
            }
            _ => Credentials::anonymous()?,
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)?.with_path_style();
        Ok(Self { bucket })
    }
}

#[async_trait]
impl CacheBackend for S3Cache {
    async fn get(&self, key: &str, format: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = object_path(key, format);
        match self.bucket.get_object(&path).await {
            Ok(data) => Ok(Some(data.to_vec())),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(
        &self,
        key: &str,
        payload: &[u8],
        _ttl: Duration,
        format: &str,
    ) -> Result<(), CacheError> {
        let path = object_path(key, format);
        self.bucket.put_object(&path, payload).await?;
        debug!(%path, bytes = payload.len(), "cache entry uploaded");
        Ok(())
    }

    async fn modified_since(
        &self,
        key: &str,
        format: &str,
    ) -> Result<Option<SystemTime>, CacheError> {
        let path = object_path(key, format);
        match self.bucket.head_object(&path).await {
            Ok((head, _status)) => Ok(head
                .last_modified
                .as_deref()
                .and_then(|date| httpdate::parse_http_date(date).ok())),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_with_defaults() {
        let cache = S3Cache::new(&S3Config::default());
        assert!(cache.is_ok());
    }

    #[test]
    fn test_construct_custom_endpoint() {
        let config = S3Config {
            server: "minio.internal:9000".to_string(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            region: None,
            bucket: "prerender".to_string(),
        };
        assert!(S3Cache::new(&config).is_ok());
    }
}
