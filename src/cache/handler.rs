use super::response_cache::{CacheStats, ResponseCache};
use crate::error::Result;
use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query for `DELETE /cache`
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateQuery {
    /// Regular expression over cache keys; omitted means clear everything
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub removed: usize,
}

/// Handler for `GET /cache/stats`
pub async fn stats_handler(State(cache): State<Arc<ResponseCache>>) -> Json<CacheStats> {
    Json(cache.stats())
}

/// Handler for `DELETE /cache?pattern=...`
pub async fn invalidate_handler(
    State(cache): State<Arc<ResponseCache>>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let removed = cache.invalidate(query.pattern.as_deref())?;
    Ok(Json(InvalidateResponse { removed }))
}

/// Operator routes for inspecting and invalidating the response cache.
///
/// Mount these behind whatever authentication the application uses; they
/// carry none of their own.
pub fn admin_routes<S>(cache: Arc<ResponseCache>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/cache/stats", get(stats_handler))
        .route("/cache", axum::routing::delete(invalidate_handler))
        .with_state(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::response_cache::CachedResponse;
    use crate::clock::ManualClock;
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, Method, Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn seeded_cache() -> Arc<ResponseCache> {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(60),
            Arc::new(ManualClock::new(0)),
        ));
        for key in ["/api/places", "/api/places/5", "/api/boards"] {
            cache.store(key, CachedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new()));
        }
        cache
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app: Router = admin_routes(seeded_cache());

        let response = app
            .oneshot(Request::builder().uri("/cache/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["size"], 3);
        assert_eq!(body["keys"][0], "/api/boards");
    }

    #[tokio::test]
    async fn test_invalidate_endpoint_with_pattern() {
        let cache = seeded_cache();
        let app: Router = admin_routes(cache.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/cache?pattern=%5E%2Fapi%2Fplaces")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["removed"], 2);
        assert_eq!(cache.stats().keys, vec!["/api/boards".to_string()]);
    }

    #[tokio::test]
    async fn test_invalidate_endpoint_rejects_bad_pattern() {
        let cache = seeded_cache();
        let app: Router = admin_routes(cache.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/cache?pattern=%28")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(cache.stats().size, 3);
    }
}
