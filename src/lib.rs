//! Wayfare - request throttling and response memoization
//!
//! The request pipeline layer of the wayfare travel-discovery API. Two
//! in-memory, key-expiring state machines sit in front of the business
//! handlers:
//!
//! - **Rate limiting**: fixed-window counters per client identity and route,
//!   with a strict policy for authentication routes and a general one for
//!   everything else
//! - **Response caching**: TTL memoization of successful GET responses keyed
//!   by normalized URL, with pattern-based invalidation
//! - **Janitor**: a recurring sweep that reclaims closed rate-limit windows
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use wayfare::{ConfigBuilder, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     wayfare::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let mut pipeline = Pipeline::new(config)?;
//!     pipeline.start();
//!
//!     let app: Router = pipeline
//!         .apply(Router::new().route("/api/places", get(|| async { "[]" })))
//!         .merge(pipeline.admin_routes());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//!     )
//!     .await?;
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
mod config;
mod error;
mod pipeline;
pub mod ratelimit;
pub mod store;
mod utils;

pub use cache::{CacheConfig, CacheStats, CachedResponse, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigBuilder, LoggingConfig};
pub use error::{Result, WayfareError};
pub use pipeline::Pipeline;
pub use ratelimit::{Decision, Janitor, RateLimitConfig, RateLimitConfigBuilder, RateLimiter};
pub use store::KeyedExpiringStore;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "wayfare=debug")
/// - `WAYFARE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = utils::parse_env_or("LOG_JSON", false);
    install_subscriber(env_filter, json_logs);
}

/// Initialize tracing from a [`LoggingConfig`]
pub fn init_tracing_with_config(config: &LoggingConfig) {
    install_subscriber(EnvFilter::new(&config.level), config.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
