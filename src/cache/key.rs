use axum::http::Uri;

/// Cache key for a GET request to `uri`.
///
/// The method is implied. Trailing slashes are dropped (except for the
/// root) and query pairs are sorted, so `/api/places/?b=2&a=1` and
/// `/api/places?a=1&b=2` share an entry.
pub fn cache_key(uri: &Uri) -> String {
    let path = uri.path();
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let mut pairs: Vec<&str> = uri
        .query()
        .map(|q| q.split('&').filter(|pair| !pair.is_empty()).collect())
        .unwrap_or_default();

    if pairs.is_empty() {
        return path.to_string();
    }

    pairs.sort_unstable();
    format!("{}?{}", path, pairs.join("&"))
}
