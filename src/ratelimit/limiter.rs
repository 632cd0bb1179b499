//! Fixed-window request counter.
//!
//! Each `(identity, route)` pair gets one window at a time. The first request
//! opens a window of `window` length; later requests inside it increment the
//! count until `limit` is reached. A request arriving at or after `reset_at`
//! opens a fresh window. Boundary bursts (up to `2 * limit` across two
//! adjacent windows) are an accepted property of fixed windows.

use crate::clock::Clock;
use crate::store::{Expiring, KeyedExpiringStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Quota applied by one [`RateLimiter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    /// Policy name, used in logs ("auth", "general")
    pub name: String,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(name: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
        }
    }

    fn window_millis(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

/// In-progress window for one identity and route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCounter {
    pub count: u32,
    /// Epoch milliseconds at which the window closes
    pub reset_at: u64,
}

/// Outcome of [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow {
        limit: u32,
        remaining: u32,
        reset_at: u64,
    },
    Deny {
        limit: u32,
        reset_at: u64,
        retry_after_seconds: u64,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Self::Allow { limit, .. } | Self::Deny { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allow { remaining, .. } => *remaining,
            Self::Deny { .. } => 0,
        }
    }

    pub fn reset_at(&self) -> u64 {
        match self {
            Self::Allow { reset_at, .. } | Self::Deny { reset_at, .. } => *reset_at,
        }
    }

    /// Window close in whole epoch seconds, rounded up
    pub fn reset_epoch_seconds(&self) -> u64 {
        self.reset_at().div_ceil(1000)
    }
}

/// Key of the bucket for `identity` on `route`
pub fn bucket_key(identity: &str, route: &str) -> String {
    format!("{}:{}", identity, route)
}

/// Fixed-window rate limiter owning its counter store
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    counters: KeyedExpiringStore<u32>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            counters: KeyedExpiringStore::new(clock),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Count a request from `identity` against `route` and decide admission
    pub fn check(&self, identity: &str, route: &str) -> Decision {
        let key = bucket_key(identity, route);
        let limit = self.policy.limit;
        let window = self.policy.window_millis();

        self.counters.update(&key, |current, now| match current {
            None => {
                let reset_at = now.saturating_add(window);
                let decision = Decision::Allow {
                    limit,
                    remaining: limit.saturating_sub(1),
                    reset_at,
                };
                (Some(Expiring::new(1, reset_at)), decision)
            }
            Some(counter) if counter.value < limit => {
                counter.value += 1;
                let decision = Decision::Allow {
                    limit,
                    remaining: limit - counter.value,
                    reset_at: counter.expires_at,
                };
                (None, decision)
            }
            Some(counter) => {
                let wait_millis = counter.expires_at.saturating_sub(now);
                let decision = Decision::Deny {
                    limit,
                    reset_at: counter.expires_at,
                    retry_after_seconds: wait_millis.div_ceil(1000),
                };
                (None, decision)
            }
        })
    }

    /// Live counter for `identity` on `route`
    pub fn counter(&self, identity: &str, route: &str) -> Option<WindowCounter> {
        self.counters
            .get_entry(&bucket_key(identity, route))
            .map(|entry| WindowCounter {
                count: entry.value,
                reset_at: entry.expires_at,
            })
    }

    /// Drop counters whose window has closed
    pub fn purge_expired(&self) -> usize {
        self.counters.purge_expired()
    }

    /// Number of counters held, including closed windows not yet purged
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.counters.keys()
    }
}
