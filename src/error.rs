use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the throttling and caching layer
///
/// Admission denials are not errors; see [`crate::ratelimit::Decision`].
#[derive(Debug, thiserror::Error)]
pub enum WayfareError {
    #[error("Invalid invalidation pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Standard error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_id: String,
}

impl WayfareError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub(crate) fn invalid_pattern(pattern: &str, err: &regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidConfig(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to clients.
    ///
    /// Client errors (4xx) carry their message. Server errors are replaced
    /// with a generic message and only logged in full (CWE-209).
    fn safe_message(&self) -> String {
        match self {
            Self::InvalidPattern { .. } => self.to_string(),
            Self::InvalidConfig(_) | Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for WayfareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "Request failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, WayfareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WayfareError::invalid_config("limit is 0").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WayfareError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = WayfareError::internal("connection string leaked");
        assert_eq!(err.safe_message(), "Internal server error");

        let regex_err = regex::Regex::new("[").unwrap_err();
        let err = WayfareError::invalid_pattern("[", &regex_err);
        assert_eq!(err.safe_message(), err.to_string());
    }

    #[test]
    fn test_invalid_pattern_display() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let err = WayfareError::invalid_pattern("(", &regex_err);
        assert!(err.to_string().starts_with("Invalid invalidation pattern `(`"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_into_response_sets_status() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let response = WayfareError::invalid_pattern("(", &regex_err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
