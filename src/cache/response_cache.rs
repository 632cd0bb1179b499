//! TTL memoizer for read-only responses
//!
//! Entries expire lazily: a lookup that finds an expired entry removes it
//! and reports a miss. There is no size bound and no LRU eviction, so a
//! long TTL over many distinct URLs grows the store until entries expire
//! or are invalidated.

use super::layer::{ResponseCacheLayer, ResponseCacheService};
use crate::clock::Clock;
use crate::error::{Result, WayfareError};
use crate::store::KeyedExpiringStore;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Memoized response payload
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Rebuild a response carrying the stored payload
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
    }
}

/// Diagnostic snapshot of the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Response cache keyed by normalized request URL
#[derive(Debug)]
pub struct ResponseCache {
    entries: KeyedExpiringStore<CachedResponse>,
    ttl: Duration,
    max_body_bytes: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: KeyedExpiringStore::new(clock),
            ttl,
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Cap on the body size the decorator will buffer and store
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Live cached response for `key`, removing it if it has expired
    pub fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let hit = self.entries.get(key);
        if hit.is_none() {
            self.entries.remove_if_expired(key);
        }
        hit
    }

    /// Store `response` under `key` for the configured TTL
    pub fn store(&self, key: impl Into<String>, response: CachedResponse) {
        self.entries.put(key, response, self.ttl);
    }

    /// Remove cached entries.
    ///
    /// `None` clears the whole cache. `Some(pattern)` is a regular
    /// expression; only keys it matches are removed. Returns the number of
    /// entries removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        let removed = match pattern {
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                removed
            }
            Some(pattern) => {
                let regex =
                    Regex::new(pattern).map_err(|e| WayfareError::invalid_pattern(pattern, &e))?;
                self.entries.retain_keys(|key| !regex.is_match(key))
            }
        };

        tracing::info!(pattern = pattern.unwrap_or("*"), removed, "Response cache invalidated");
        Ok(removed)
    }

    /// Remove entries whose key is `path` or lies below it
    pub fn invalidate_path(&self, path: &str) -> usize {
        let path = path.trim_end_matches('/');
        self.entries.retain_keys(|key| {
            let Some(rest) = key.strip_prefix(path) else {
                return true;
            };
            !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
        })
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys = self.entries.keys();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }

    /// Decorate `inner` so its GET responses are memoized
    pub fn wrap<S>(self: &Arc<Self>, inner: S) -> ResponseCacheService<S> {
        ResponseCacheService::new(inner, self.clone(), false)
    }

    /// Tower layer applying [`ResponseCache::wrap`] to every route
    pub fn layer(self: &Arc<Self>) -> ResponseCacheLayer {
        ResponseCacheLayer::new(self.clone())
    }
}
