use super::limiter::RateLimitPolicy;
use crate::error::{Result, WayfareError};
use crate::utils::{get_env_with_prefix, parse_env_or};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quota for one named policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Maximum number of requests allowed per window
    pub max_requests: u32,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl PolicyConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_requests == 0 {
            return Err(WayfareError::invalid_config(format!(
                "Rate limit policy '{}' max_requests must be greater than 0",
                name
            )));
        }
        if self.window_ms == 0 {
            return Err(WayfareError::invalid_config(format!(
                "Rate limit policy '{}' window_ms must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

/// Which policy a request path falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Auth,
    General,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Strict policy for authentication-sensitive routes
    #[serde(default = "default_auth_policy")]
    pub auth: PolicyConfig,

    /// Policy for every other route
    #[serde(default = "default_general_policy")]
    pub general: PolicyConfig,

    /// Path prefixes counted against the auth policy
    #[serde(default = "default_auth_paths")]
    pub auth_paths: Vec<String>,

    /// Path prefixes that bypass rate limiting entirely
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// Trust X-Forwarded-For / X-Real-IP for client identity
    ///
    /// **SECURITY WARNING**: leave enabled only behind a reverse proxy that
    /// overwrites (not appends to) these headers. Without one, clients can
    /// choose their own bucket by sending the header themselves.
    ///
    /// Default: `true`
    #[serde(default = "default_trust_proxy")]
    pub trust_proxy: bool,

    /// Seconds between janitor sweeps of expired counters
    #[serde(default = "default_janitor_interval_seconds")]
    pub janitor_interval_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auth: default_auth_policy(),
            general: default_general_policy(),
            auth_paths: default_auth_paths(),
            exempt_paths: default_exempt_paths(),
            trust_proxy: default_trust_proxy(),
            janitor_interval_seconds: default_janitor_interval_seconds(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new RateLimitConfig builder
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Load rate limit configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.enabled = parse_env_or("RATE_LIMIT_ENABLED", config.enabled);
        config.trust_proxy = parse_env_or("RATE_LIMIT_TRUST_PROXY", config.trust_proxy);
        config.auth.max_requests =
            parse_env_or("RATE_LIMIT_AUTH_MAX_REQUESTS", config.auth.max_requests);
        config.auth.window_ms = parse_env_or("RATE_LIMIT_AUTH_WINDOW_MS", config.auth.window_ms);
        config.general.max_requests =
            parse_env_or("RATE_LIMIT_GENERAL_MAX_REQUESTS", config.general.max_requests);
        config.general.window_ms =
            parse_env_or("RATE_LIMIT_GENERAL_WINDOW_MS", config.general.window_ms);
        config.janitor_interval_seconds = parse_env_or(
            "RATE_LIMIT_JANITOR_INTERVAL_SECONDS",
            config.janitor_interval_seconds,
        );

        if let Some(paths) = get_env_with_prefix("RATE_LIMIT_AUTH_PATHS") {
            config.auth_paths = split_paths(&paths);
        }

        if let Some(paths) = get_env_with_prefix("RATE_LIMIT_EXEMPT_PATHS") {
            config.exempt_paths = split_paths(&paths);
        }

        config
    }

    pub fn auth_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new("auth", self.auth.max_requests, self.auth.window())
    }

    pub fn general_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new("general", self.general.max_requests, self.general.window())
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_seconds)
    }

    /// Policy that governs `path`
    pub fn policy_for(&self, path: &str) -> PolicyKind {
        if matches_prefix(&self.auth_paths, path) {
            PolicyKind::Auth
        } else {
            PolicyKind::General
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        matches_prefix(&self.exempt_paths, path)
    }

    /// Reject quotas the limiter cannot honour
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.auth.validate("auth")?;
        self.general.validate("general")?;
        if self.janitor_interval_seconds == 0 {
            return Err(WayfareError::invalid_config(
                "Rate limit janitor_interval_seconds must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// `prefix` matches `path` itself or anything below it ("/health" matches
/// "/health/live" but not "/healthz")
fn matches_prefix(prefixes: &[String], path: &str) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn split_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builder for RateLimitConfig
#[must_use = "builder does nothing until you call build()"]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RateLimitConfig::default(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn auth_policy(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.config.auth = PolicyConfig::new(max_requests, window_ms);
        self
    }

    pub fn general_policy(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.config.general = PolicyConfig::new(max_requests, window_ms);
        self
    }

    pub fn auth_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.auth_paths.push(prefix.into());
        self
    }

    pub fn auth_paths<I, P>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.config.auth_paths = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn exempt_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.exempt_paths.push(prefix.into());
        self
    }

    /// Trust proxy headers for client identity.
    ///
    /// See [`RateLimitConfig::trust_proxy`] for the security implications.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.config.trust_proxy = trust;
        self
    }

    pub fn janitor_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.janitor_interval_seconds = seconds;
        self
    }

    pub fn build(self) -> RateLimitConfig {
        self.config
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_auth_policy() -> PolicyConfig {
    PolicyConfig::new(10, 60_000)
}

fn default_general_policy() -> PolicyConfig {
    PolicyConfig::new(100, 60_000)
}

fn default_auth_paths() -> Vec<String> {
    vec!["/api/auth".to_string()]
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

fn default_trust_proxy() -> bool {
    true
}

fn default_janitor_interval_seconds() -> u64 {
    60
}
