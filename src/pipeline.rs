//! Composition root for the throttling and caching layer.
//!
//! [`Pipeline`] owns both rate limiters, the response cache and the janitor.
//! Applied to a router, every request passes the rate limiter first, then
//! (for GET requests) the cache, and only then reaches the handler.

use crate::cache::{ResponseCache, ResponseCacheLayer, admin_routes};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::ratelimit::{Janitor, RateLimitLayer, RateLimiter};
use axum::Router;
use std::sync::Arc;

pub struct Pipeline {
    config: Config,
    auth_limiter: Arc<RateLimiter>,
    general_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    janitor: Janitor,
}

impl Pipeline {
    /// Build a pipeline on the system clock
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a pipeline reading time from `clock`
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.rate_limit.validate()?;
        config.cache.validate()?;

        let auth_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.auth_policy(),
            clock.clone(),
        ));
        let general_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.general_policy(),
            clock.clone(),
        ));
        let cache = Arc::new(
            ResponseCache::new(config.cache.ttl(), clock)
                .with_max_body_bytes(config.cache.max_body_bytes),
        );
        let janitor = Janitor::new(
            vec![auth_limiter.clone(), general_limiter.clone()],
            config.rate_limit.janitor_interval(),
        );

        Ok(Self {
            config,
            auth_limiter,
            general_limiter,
            cache,
            janitor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth_limiter(&self) -> &Arc<RateLimiter> {
        &self.auth_limiter
    }

    pub fn general_limiter(&self) -> &Arc<RateLimiter> {
        &self.general_limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    /// Rate limit layer, or None if rate limiting is disabled
    pub fn rate_limit_layer(&self) -> Option<RateLimitLayer> {
        if !self.config.rate_limit.enabled {
            return None;
        }

        Some(RateLimitLayer::new(
            self.config.rate_limit.clone(),
            self.auth_limiter.clone(),
            self.general_limiter.clone(),
        ))
    }

    /// Response cache layer, or None if caching is disabled
    pub fn cache_layer(&self) -> Option<ResponseCacheLayer> {
        if !self.config.cache.enabled {
            return None;
        }

        Some(
            self.cache
                .layer()
                .invalidate_on_write(self.config.cache.invalidate_on_write),
        )
    }

    /// Wrap `router` so the rate limiter runs before the cache
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let mut router = router;

        // Layers added later run first
        if let Some(layer) = self.cache_layer() {
            router = router.layer(layer);
        }
        if let Some(layer) = self.rate_limit_layer() {
            router = router.layer(layer);
        }

        router
    }

    /// Cache inspection and invalidation routes
    pub fn admin_routes<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        admin_routes(self.cache.clone())
    }

    /// Start background maintenance. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        if self.config.rate_limit.enabled {
            self.janitor.start();
        }
    }

    /// Stop background maintenance
    pub async fn shutdown(mut self) {
        self.janitor.stop().await;
        tracing::info!("Request pipeline shut down");
    }
}
