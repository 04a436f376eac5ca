//! Per-browser-family circuit breaker.
//!
//! Keyed by the family derived from the request's User-Agent so one
//! misbehaving crawler cannot starve the others. Opens after a run of
//! consecutive failures, rejects until the cool-down elapses, and closes
//! again on the first success of the half-open probe. In-process only.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use prerender_config::CircuitBreakerConfig;
use tracing::warn;

#[derive(Default)]
struct FamilyState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    families: Mutex<HashMap<String, FamilyState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a render for this family may proceed.
    pub fn check(&self, family: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let families = self.families.lock();
        match families.get(family).and_then(|s| s.opened_at) {
            Some(opened_at) => opened_at.elapsed() >= self.config.reset_timeout,
            None => true,
        }
    }

    pub fn record_success(&self, family: &str) {
        if !self.config.enabled {
            return;
        }
        self.families.lock().remove(family);
    }

    pub fn record_failure(&self, family: &str) {
        if !self.config.enabled {
            return;
        }
        let mut families = self.families.lock();
        let state = families.entry(family.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.fail_max {
            if state.opened_at.is_none() {
                warn!(%family, failures = state.consecutive_failures, "circuit breaker opened");
            }
            state.opened_at = Some(Instant::now());
        }
    }
}

/// Collapse a User-Agent into a coarse crawler family.
pub fn browser_family(user_agent: &str) -> String {
    let ua = user_agent.to_ascii_lowercase();
    for known in [
        "googlebot",
        "bingbot",
        "yandex",
        "baiduspider",
        "duckduckbot",
        "twitterbot",
        "facebookexternalhit",
        "slackbot",
        "linkedinbot",
    ] {
        if ua.contains(known) {
            return known.to_string();
        }
    }
    ua.split(['/', ' '])
        .next()
        .filter(|token| !token.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
