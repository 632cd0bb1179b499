//! Rate limiting tower layer
//!
//! Routes each request to the auth or general [`RateLimiter`], annotates
//! admitted responses with `X-RateLimit-*` headers and answers denied ones
//! with `429 Too Many Requests` and a `Retry-After` hint.

use super::config::{PolicyKind, RateLimitConfig};
use super::identity::client_identity;
use super::limiter::{Decision, RateLimiter};
use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Body of a 429 response
#[derive(serde::Serialize)]
struct RateLimitError {
    error: String,
    message: String,
    retry_after: u64,
}

/// Write the `X-RateLimit-*` headers for `decision`
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(decision.limit()));
    headers.insert(HEADER_REMAINING, HeaderValue::from(decision.remaining()));
    headers.insert(HEADER_RESET, HeaderValue::from(decision.reset_epoch_seconds()));
}

fn too_many_requests(decision: &Decision, retry_after: u64) -> Response {
    let body = RateLimitError {
        error: "rate_limit_exceeded".to_string(),
        message: format!(
            "Rate limit exceeded. Please try again in {} seconds",
            retry_after
        ),
        retry_after,
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(HEADER_RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Limiters and routing rules shared by every clone of the service
#[derive(Debug)]
struct RateLimitState {
    auth: Arc<RateLimiter>,
    general: Arc<RateLimiter>,
    config: RateLimitConfig,
}

impl RateLimitState {
    fn limiter_for(&self, path: &str) -> &RateLimiter {
        match self.config.policy_for(path) {
            PolicyKind::Auth => &self.auth,
            PolicyKind::General => &self.general,
        }
    }
}

/// Tower layer for rate limiting
#[derive(Clone)]
pub struct RateLimitLayer {
    state: Arc<RateLimitState>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig, auth: Arc<RateLimiter>, general: Arc<RateLimiter>) -> Self {
        Self {
            state: Arc::new(RateLimitState {
                auth,
                general,
                config,
            }),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// Tower service for rate limiting
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: Arc<RateLimitState>,
}

impl<S> Service<Request> for RateLimitService<S>
where
    S: Service<Request> + Clone + Send + Sync + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let path = req.uri().path().to_string();
        let mut svc = self.inner.clone();

        if self.state.config.is_exempt(&path) {
            return Box::pin(async move {
                let response = svc.call(req).await?;
                Ok(response.into_response())
            });
        }

        let identity = client_identity(&req, self.state.config.trust_proxy);
        let limiter = self.state.limiter_for(&path);

        // One bucket per route pattern; unmatched requests fall back to the raw path
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| path.clone());

        // Counting happens here, synchronously, before any await
        let decision = limiter.check(&identity, &route);

        match decision {
            Decision::Allow { .. } => Box::pin(async move {
                let mut response = svc.call(req).await?.into_response();
                apply_rate_limit_headers(response.headers_mut(), &decision);
                Ok(response)
            }),
            Decision::Deny {
                retry_after_seconds,
                ..
            } => {
                tracing::warn!(
                    policy = %limiter.policy().name,
                    identity = %identity,
                    route = %route,
                    retry_after = retry_after_seconds,
                    "ratelimit.denied"
                );
                let response = too_many_requests(&decision, retry_after_seconds);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
