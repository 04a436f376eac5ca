//! Shared application state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prerender_browser::PagePool;
use prerender_cache::CacheBackend;
use prerender_config::Config;

use crate::breaker::CircuitBreaker;

pub struct AppState {
    pub config: Config,
    pub pool: PagePool,
    pub cache: Arc<dyn CacheBackend>,
    pub breaker: CircuitBreaker,
    /// Effective concurrency; `/browser/disable` drops it to zero, which
    /// turns the service into a cache-only responder.
    effective_concurrency: AtomicUsize,
}

impl AppState {
    pub fn new(config: Config, pool: PagePool, cache: Arc<dyn CacheBackend>) -> Self {
        let breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        let effective_concurrency = AtomicUsize::new(config.concurrency);
        Self {
            config,
            pool,
            cache,
            breaker,
            effective_concurrency,
        }
    }

    pub fn rendering_enabled(&self) -> bool {
        self.effective_concurrency.load(Ordering::SeqCst) > 0
    }

    pub fn disable_rendering(&self) {
        self.effective_concurrency.store(0, Ordering::SeqCst);
    }

    pub fn enable_rendering(&self) {
        self.effective_concurrency
            .store(self.config.concurrency, Ordering::SeqCst);
    }
}
