//! Error types for Blogfed
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` and renders the uniform
//! `{code, bizErr, msg, data, meta}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::federation::FederationError;

/// Application-wide error type
///
/// Signature and policy failures map to 401, missing entities to 404,
/// malformed payloads to 400, discovery failures to 502 and persistence
/// failures to 500.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Signature, policy or credential rejection (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Federation protocol error (401/400/502 depending on kind)
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "PARAMS_ERROR", msg.clone()),
            AppError::Federation(err) if err.is_signature_error() => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "signature verification failed".to_string(),
            ),
            AppError::Federation(err @ FederationError::OutboundDisabled(_)) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string())
            }
            AppError::Federation(err @ FederationError::InvalidTarget(_)) => {
                (StatusCode::BAD_REQUEST, "PARAMS_ERROR", err.to_string())
            }
            AppError::Federation(err @ FederationError::Discovery { .. }) => {
                (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", err.to_string())
            }
            AppError::Federation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                "Internal server error".to_string(),
            ),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", self.to_string()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                "Database error".to_string(),
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR", msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and the envelope body with `data: null`.
    fn into_response(self) -> Response {
        let (status, biz_err, msg) = self.classify();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[biz_err]).inc();

        let body = crate::api::Envelope::new(
            i32::from(status.as_u16()),
            biz_err,
            msg,
            serde_json::Value::Null,
        );

        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_errors_map_to_unauthorized() {
        let error = AppError::from(FederationError::InvalidDigest);
        assert_eq!(error.classify().0, StatusCode::UNAUTHORIZED);

        let error = AppError::from(FederationError::SignatureExpired);
        assert_eq!(error.classify().0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn discovery_errors_map_to_bad_gateway() {
        let error = AppError::from(FederationError::Discovery {
            url: "https://peer.example/.well-known/blog-federation/manifest.json".to_string(),
            reason: "HTTP 500".to_string(),
        });
        assert_eq!(error.classify().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, biz_err, msg) =
            AppError::Validation("requester_url is required".to_string()).classify();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(biz_err, "PARAMS_ERROR");
        assert_eq!(msg, "requester_url is required");
    }
}
