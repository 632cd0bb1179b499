//! Client identity resolution for rate-limit buckets.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Identity used when no address can be determined.
///
/// All such clients share one bucket per route.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Resolve the identity a request is counted against.
///
/// With `trust_proxy` the leftmost `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. The connection address (`ConnectInfo`) comes next, and
/// [`UNKNOWN_IDENTITY`] last, so the result is never empty.
///
/// **SECURITY WARNING**: only trust proxy headers behind a reverse proxy
/// that overwrites them; otherwise clients can pick their own bucket.
pub fn client_identity(req: &Request, trust_proxy: bool) -> String {
    let forwarded = if trust_proxy {
        forwarded_address(req)
    } else {
        None
    };

    forwarded
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

fn forwarded_address(req: &Request) -> Option<String> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    // "client, proxy1, proxy2": the leftmost entry is the original client
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}
