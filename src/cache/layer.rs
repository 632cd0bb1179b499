//! Response cache tower layer
//!
//! Decorates an inner service: GET requests are answered from the cache
//! when a live entry exists, otherwise the inner response is buffered,
//! stored and returned unchanged. Everything else passes straight through,
//! as do streaming bodies (no size bound, over the size cap, or SSE).

use super::key::cache_key;
use super::response_cache::{CachedResponse, ResponseCache};
use crate::error::WayfareError;
use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower::{Layer, Service};

pub const HEADER_CACHE: &str = "x-cache";

fn mark(response: &mut Response, status: &'static str) {
    response
        .headers_mut()
        .insert(HEADER_CACHE, HeaderValue::from_static(status));
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

/// Whether a body is small enough, and known to be small enough up front, to buffer
fn fits_in_cache(body: &Body, max_body_bytes: usize) -> bool {
    body.size_hint()
        .upper()
        .and_then(|upper| usize::try_from(upper).ok())
        .is_some_and(|upper| upper <= max_body_bytes)
}

/// Tower layer for response caching
#[derive(Clone)]
pub struct ResponseCacheLayer {
    cache: Arc<ResponseCache>,
    invalidate_on_write: bool,
}

impl ResponseCacheLayer {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            invalidate_on_write: false,
        }
    }

    /// Drop cached entries under a path after a successful non-GET request to it
    pub fn invalidate_on_write(mut self, enabled: bool) -> Self {
        self.invalidate_on_write = enabled;
        self
    }
}

impl<S> Layer<S> for ResponseCacheLayer {
    type Service = ResponseCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseCacheService::new(inner, self.cache.clone(), self.invalidate_on_write)
    }
}

/// Tower service for response caching
#[derive(Clone)]
pub struct ResponseCacheService<S> {
    inner: S,
    cache: Arc<ResponseCache>,
    invalidate_on_write: bool,
}

impl<S> ResponseCacheService<S> {
    pub(crate) fn new(inner: S, cache: Arc<ResponseCache>, invalidate_on_write: bool) -> Self {
        Self {
            inner,
            cache,
            invalidate_on_write,
        }
    }
}

impl<S> Service<Request> for ResponseCacheService<S>
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
        let mut svc = self.inner.clone();
        let cache = self.cache.clone();

        if req.method() != Method::GET {
            let invalidate_path = self
                .invalidate_on_write
                .then(|| req.uri().path().to_string());

            return Box::pin(async move {
                let response = svc.call(req).await?.into_response();
                if let Some(path) = invalidate_path {
                    if response.status().is_success() {
                        let removed = cache.invalidate_path(&path);
                        tracing::debug!(path = %path, removed, "Response cache invalidated by write");
                    }
                }
                Ok(response)
            });
        }

        let key = cache_key(req.uri());

        if let Some(hit) = cache.lookup(&key) {
            tracing::debug!(key = %key, "cache.hit");
            let mut response = hit.to_response();
            mark(&mut response, "HIT");
            return Box::pin(async move { Ok(response) });
        }

        Box::pin(async move {
            // Inner errors propagate untouched and are never stored
            let response = svc.call(req).await?.into_response();

            if !response.status().is_success() {
                return Ok(response);
            }

            let (parts, body) = response.into_parts();
            let max_body_bytes = cache.max_body_bytes();
            if is_event_stream(&parts.headers) || !fits_in_cache(&body, max_body_bytes) {
                tracing::debug!(key = %key, "cache.bypass");
                return Ok(Response::from_parts(parts, body));
            }

            let bytes = match axum::body::to_bytes(body, max_body_bytes).await {
                Ok(bytes) => bytes,
                // The body is already partly consumed and `S::Error` cannot be
                // built from a body error, so the upstream response is lost here
                Err(e) => {
                    return Ok(WayfareError::internal(format!(
                        "Failed to buffer response body for {}: {}",
                        key, e
                    ))
                    .into_response());
                }
            };

            cache.store(
                key.clone(),
                CachedResponse::new(parts.status, parts.headers.clone(), bytes.clone()),
            );
            tracing::debug!(key = %key, "cache.miss");

            let mut response = Response::from_parts(parts, Body::from(bytes));
            mark(&mut response, "MISS");
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::{
        Router,
        http::StatusCode,
        routing::get,
    };
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn counting_router(cache: &Arc<ResponseCache>, calls: Arc<AtomicUsize>) -> Router {
        let failing_calls = calls.clone();
        Router::new()
            .route(
                "/api/places",
                get(move || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { format!("places v{}", n) }
                })
                .post(|| async { StatusCode::CREATED }),
            )
            .route(
                "/api/broken",
                get(move || {
                    failing_calls.fetch_add(1, Ordering::SeqCst);
                    async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }
                }),
            )
            .layer(cache.layer())
    }

    fn request(method: Method, uri: &str) -> Request {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_hit_within_ttl_miss_after() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_millis(500), clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_router(&cache, calls.clone());

        let first = app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        assert_eq!(first.headers()[HEADER_CACHE], "MISS");
        assert_eq!(body_string(first).await, "places v1");

        clock.set(100);
        let second = app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        assert_eq!(second.headers()[HEADER_CACHE], "HIT");
        assert_eq!(body_string(second).await, "places v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.set(600);
        let third = app.oneshot(request(Method::GET, "/api/places")).await.unwrap();
        assert_eq!(third.headers()[HEADER_CACHE], "MISS");
        assert_eq!(body_string(third).await, "places v2");
    }

    #[tokio::test]
    async fn test_hit_preserves_content_type() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_router(&cache, calls);

        app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        let hit = app.oneshot(request(Method::GET, "/api/places")).await.unwrap();

        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(hit.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_normalized_urls_share_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_router(&cache, calls.clone());

        app.clone().oneshot(request(Method::GET, "/api/places?b=2&a=1")).await.unwrap();
        let hit = app.oneshot(request(Method::GET, "/api/places?a=1&b=2")).await.unwrap();

        assert_eq!(hit.headers()[HEADER_CACHE], "HIT");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutating_requests_bypass_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_router(&cache, calls);

        let created = app.clone().oneshot(request(Method::POST, "/api/places")).await.unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert!(created.headers().get(HEADER_CACHE).is_none());
        assert_eq!(cache.stats().size, 0);

        // A cached GET is never served to a POST
        app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        let created = app.oneshot(request(Method::POST, "/api/places")).await.unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert!(created.headers().get(HEADER_CACHE).is_none());
    }

    #[tokio::test]
    async fn test_failed_responses_are_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counting_router(&cache, calls.clone());

        for _ in 0..2 {
            let response = app.clone().oneshot(request(Method::GET, "/api/broken")).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(response.headers().get(HEADER_CACHE).is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn test_inner_error_propagates() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let inner = tower::service_fn(|_req: Request| async {
            Err::<Response, _>(std::io::Error::other("upstream down"))
        });
        let svc = cache.wrap(inner);

        let err = svc.oneshot(request(Method::GET, "/api/places")).await.unwrap_err();
        assert_eq!(err.to_string(), "upstream down");
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn test_invalidate_on_write() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let app = Router::new()
            .route(
                "/api/places",
                get(|| async { "places" }).post(|| async { StatusCode::CREATED }),
            )
            .route("/api/boards", get(|| async { "boards" }))
            .layer(cache.layer().invalidate_on_write(true));

        app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        app.clone().oneshot(request(Method::GET, "/api/boards")).await.unwrap();
        assert_eq!(cache.stats().size, 2);

        app.oneshot(request(Method::POST, "/api/places")).await.unwrap();
        assert_eq!(cache.stats().keys, vec!["/api/boards".to_string()]);
    }

    #[tokio::test]
    async fn test_open_stream_is_not_buffered() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let app = Router::new()
            .route(
                "/api/events",
                get(|| async {
                    let first = futures::stream::iter(vec![Ok::<_, std::io::Error>("data: 1\n\n")]);
                    Body::from_stream(first.chain(futures::stream::pending()))
                }),
            )
            .layer(cache.layer());

        let response = tokio::time::timeout(
            Duration::from_secs(2),
            app.oneshot(request(Method::GET, "/api/events")),
        )
        .await
        .expect("headers should arrive before the stream ends")
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(HEADER_CACHE).is_none());
        assert_eq!(cache.stats().size, 0);

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"data: 1\n\n");
    }

    #[tokio::test]
    async fn test_stream_failure_reaches_client_unchanged() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), clock));
        let app = Router::new()
            .route(
                "/api/export",
                get(|| async {
                    Body::from_stream(futures::stream::iter(vec![
                        Ok("row 1\n"),
                        Err(std::io::Error::other("upstream reset")),
                    ]))
                }),
            )
            .layer(cache.layer());

        let response = app.oneshot(request(Method::GET, "/api/export")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
        assert_eq!(cache.stats().size, 0);
    }

    #[tokio::test]
    async fn test_event_stream_and_oversized_bodies_bypass_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(
            ResponseCache::new(Duration::from_secs(60), clock).with_max_body_bytes(8),
        );
        let app = Router::new()
            .route(
                "/api/feed",
                get(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], "data: 1\n\n") }),
            )
            .route("/api/places", get(|| async { "a body longer than eight bytes" }))
            .route("/api/ping", get(|| async { "pong" }))
            .layer(cache.layer());

        let feed = app.clone().oneshot(request(Method::GET, "/api/feed")).await.unwrap();
        assert!(feed.headers().get(HEADER_CACHE).is_none());

        let places = app.clone().oneshot(request(Method::GET, "/api/places")).await.unwrap();
        assert!(places.headers().get(HEADER_CACHE).is_none());
        assert_eq!(body_string(places).await, "a body longer than eight bytes");

        let ping = app.oneshot(request(Method::GET, "/api/ping")).await.unwrap();
        assert_eq!(ping.headers()[HEADER_CACHE], "MISS");
        assert_eq!(cache.stats().keys, vec!["/api/ping".to_string()]);
    }
}
