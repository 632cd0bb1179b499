use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{Result, WayfareError};
use crate::ratelimit::RateLimitConfig;
use crate::utils::{get_env_with_prefix, parse_env_or};

/// Top-level configuration, supplied once at process startup
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Load configuration from environment variables with WAYFARE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        self.config.logging.json = parse_env_or("LOG_JSON", self.config.logging.json);

        self.config.rate_limit = RateLimitConfig::from_env();
        self.config.cache = CacheConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if the log level is unknown, a rate limit policy
    /// has a zero limit or window, the janitor interval is zero, or the
    /// cache TTL is zero.
    pub fn build(self) -> Result<Config> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(WayfareError::invalid_config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        self.config.rate_limit.validate()?;
        self.config.cache.validate()?;

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
