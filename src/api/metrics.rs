//! Prometheus metrics endpoint

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::metrics::{CACHE_SIZE, REGISTRY};

/// GET /metrics
///
/// Refreshes the metadata cache gauges before encoding.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let stats = state.metadata_cache.stats().await;
    CACHE_SIZE
        .with_label_values(&["metadata_valid"])
        .set(stats.valid_entries as i64);
    CACHE_SIZE
        .with_label_values(&["metadata_expired"])
        .set(stats.expired_entries as i64);

    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

pub fn metrics_router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler))
}
