//! Response caching.
//!
//! Memoizes successful GET responses by normalized URL for a fixed TTL and
//! lets operators invalidate entries by regular expression.

mod config;
mod handler;
mod key;
mod layer;
mod response_cache;

pub use config::CacheConfig;
pub use handler::{InvalidateQuery, InvalidateResponse, admin_routes};
pub use key::cache_key;
pub use layer::{HEADER_CACHE, ResponseCacheLayer, ResponseCacheService};
pub use response_cache::{CacheStats, CachedResponse, ResponseCache};
