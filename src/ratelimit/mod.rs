//! Rate limiting.
//!
//! Fixed-window counters keyed by client identity and route, with a strict
//! policy for authentication routes and a general policy for the rest.
//! Closed windows are reclaimed by the [`Janitor`].

mod config;
mod identity;
mod janitor;
mod layer;
mod limiter;

pub use config::{PolicyConfig, PolicyKind, RateLimitConfig, RateLimitConfigBuilder};
pub use identity::{UNKNOWN_IDENTITY, client_identity};
pub use janitor::Janitor;
pub use layer::{
    HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER, RateLimitLayer,
    RateLimitService, apply_rate_limit_headers,
};
pub use limiter::{Decision, RateLimitPolicy, RateLimiter, WindowCounter, bucket_key};
