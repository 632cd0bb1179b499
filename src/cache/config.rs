use crate::error::{Result, WayfareError};
use crate::utils::parse_env_or;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Whether GET responses are memoized
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Time-to-live for cached responses (in milliseconds)
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Drop cached entries under a path after a successful write to it
    #[serde(default)]
    pub invalidate_on_write: bool,

    /// Largest response body that is buffered and stored; bigger or unbounded bodies stream through
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_ms: default_ttl_ms(),
            invalidate_on_write: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl CacheConfig {
    /// Load cache configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.enabled = parse_env_or("CACHE_ENABLED", config.enabled);
        config.ttl_ms = parse_env_or("CACHE_TTL_MS", config.ttl_ms);
        config.invalidate_on_write =
            parse_env_or("CACHE_INVALIDATE_ON_WRITE", config.invalidate_on_write);
        config.max_body_bytes = parse_env_or("CACHE_MAX_BODY_BYTES", config.max_body_bytes);
        config
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_invalidate_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_on_write = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.ttl_ms == 0 {
            return Err(WayfareError::invalid_config(
                "Cache ttl_ms must be greater than 0 when enabled",
            ));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}
