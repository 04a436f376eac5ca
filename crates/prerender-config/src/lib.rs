//! # Prerender Config
//!
//! Configuration for the prerender gateway. Everything is driven by
//! environment variables so the service can be configured the same way in
//! a container and on a developer machine.

mod error;
mod schema;

pub use error::ConfigError;
pub use schema::{CacheBackendKind, CacheConfig, CircuitBreakerConfig, Config, S3Config};
