//! Configuration schema and environment loading.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// User agent announced to rendered sites.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/59.0.3033.0 Safari/537.36 Prerender";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address for the HTTP front door.
    pub host: String,
    /// Listen port for the HTTP front door.
    pub port: u16,
    /// Host of the browser's remote debugging endpoint.
    pub chrome_host: String,
    /// Port of the browser's remote debugging endpoint.
    pub chrome_port: u16,
    /// Page pool size; also the number of concurrent renders.
    pub concurrency: usize,
    /// Wall-clock budget for a single render.
    pub prerender_timeout: Duration,
    /// Renders served by one page before it is replaced.
    pub iterations: u32,
    /// Hostname allow-list; empty means allow all.
    pub allowed_domains: HashSet<String>,
    /// User agent override applied to every page.
    pub user_agent: String,

    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            chrome_host: "localhost".to_string(),
            chrome_port: 9222,
            concurrency: default_concurrency(),
            prerender_timeout: Duration::from_secs(30),
            iterations: 200,
            allowed_domains: HashSet::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Unset variables fall back to defaults; present-but-invalid values
    /// are a startup error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();
        Ok(Self {
            host: env_string("HOST", defaults.host),
            port: env_parse("PORT", defaults.port)?,
            chrome_host: env_string("CHROME_HOST", defaults.chrome_host),
            chrome_port: env_parse("CHROME_PORT", defaults.chrome_port)?,
            concurrency: env_parse("CONCURRENCY", defaults.concurrency)?,
            prerender_timeout: Duration::from_secs(env_parse("PRERENDER_TIMEOUT", 30u64)?),
            iterations: env_parse("ITERATIONS", defaults.iterations)?,
            allowed_domains: parse_domain_list(&env_string("ALLOWED_DOMAINS", String::new())),
            user_agent: env_string("USER_AGENT", defaults.user_agent),
            cache: CacheConfig::from_env()?,
            circuit_breaker: CircuitBreakerConfig::from_env()?,
        })
    }

    /// The browser's HTTP control endpoint.
    pub fn chrome_endpoint(&self) -> String {
        format!("http://{}:{}", self.chrome_host, self.chrome_port)
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Dummy,
    Disk,
    S3,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dummy" => Ok(Self::Dummy),
            "disk" => Ok(Self::Disk),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown cache backend '{other}'")),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Root directory for the disk backend.
    pub root_dir: PathBuf,
    /// Default artifact TTL.
    pub live_time: Duration,
    pub s3: S3Config,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Dummy,
            root_dir: PathBuf::from("/tmp/prerender"),
            live_time: Duration::from_secs(3600),
            s3: S3Config::default(),
        }
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = CacheConfig::default();
        Ok(Self {
            backend: env_parse("CACHE_BACKEND", defaults.backend)?,
            root_dir: PathBuf::from(env_string(
                "CACHE_ROOT_DIR",
                defaults.root_dir.to_string_lossy().into_owned(),
            )),
            live_time: Duration::from_secs(env_parse("CACHE_LIVE_TIME", 3600u64)?),
            s3: S3Config::from_env(),
        })
    }
}

/// S3-compatible object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub server: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub bucket: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            server: "s3.amazonaws.com".to_string(),
            access_key: None,
            secret_key: None,
            region: None,
            bucket: "prerender".to_string(),
        }
    }
}

impl S3Config {
    fn from_env() -> Self {
        let defaults = S3Config::default();
        Self {
            server: env_string("S3_SERVER", defaults.server),
            access_key: std::env::var("S3_ACCESS_KEY").ok(),
            secret_key: std::env::var("S3_SECRET_KEY").ok(),
            region: std::env::var("S3_REGION").ok(),
            bucket: env_string("S3_BUCKET", defaults.bucket),
        }
    }
}

/// Circuit breaker settings for the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive failures before the breaker opens.
    pub fail_max: u32,
    /// Cool-down before a half-open probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fail_max: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: parse_bool(&env_string("ENABLE_CIRCUIT_BREAKER", String::new())),
            fail_max: env_parse("CIRCUIT_BREAKER_FAIL_MAX", 5u32)?,
            reset_timeout: Duration::from_secs(env_parse("CIRCUIT_BREAKER_RESET_TIMEOUT", 60u64)?),
        })
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
}

fn env_string(name: &str, default: String) -> String {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: name.to_string(),
            message: e.to_string(),
        }),
        _ => Ok(default),
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn parse_domain_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
