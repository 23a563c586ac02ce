//! Authentication middleware
//!
//! Protects the admin routes with the static bearer token from
//! `admin.api_token`.

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;

fn extract_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Compare without short-circuiting on the first differing byte
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware to require the admin token
///
/// # Usage
/// ```ignore
/// let admin_routes = Router::new()
///     .route("/instances", ...)
///     .layer(middleware::from_fn_with_state(state, require_admin_token));
/// ```
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    if !tokens_match(token, &state.config.admin.api_token) {
        tracing::warn!(
            path = %request.uri().path(),
            "Admin request with invalid token"
        );
        return Err(AppError::Unauthorized("invalid bearer token".to_string()));
    }

    Ok(next.run(request).await)
}
