//! Signed inbound federation endpoints
//!
//! - POST /api/federation/friendlinks/request
//! - POST /api/federation/citations/request
//! - POST /api/federation/mentions/notify
//!
//! Each request is verified against the raw body before the payload is
//! even decoded.

use axum::{
    Router,
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method},
    routing::{get, post},
};
use serde::de::DeserializeOwned;

use super::response::{Envelope, ok};
use super::timeline;
use crate::AppState;
use crate::error::AppError;
use crate::federation::{
    CitationRequestPayload, CitationRequestResult, FriendLinkRequestPayload,
    FriendLinkRequestResult, InboundAction, MentionNotifyPayload, MentionNotifyResult,
    VerifiedSignature, parse_signature_header,
};
use crate::metrics::{FEDERATION_INBOUND_TOTAL, SIGNATURE_FAILURES_TOTAL};

/// Create federation router, nested under `/api/federation`
///
/// Routes:
/// - POST /friendlinks/request
/// - POST /citations/request
/// - POST /mentions/notify
/// - GET /timeline/posts
/// - GET /posts/:id
pub fn federation_router() -> Router<AppState> {
    Router::new()
        .route("/friendlinks/request", post(request_friend_link))
        .route("/citations/request", post(request_citation))
        .route("/mentions/notify", post(notify_mention))
        .route("/timeline/posts", get(timeline::timeline_posts))
        .route("/posts/:id", get(timeline::post_detail))
}

/// POST /api/federation/friendlinks/request
async fn request_friend_link(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope<FriendLinkRequestResult>, AppError> {
    let action = InboundAction::FriendLinkRequest;
    let signature = verify(&state, action, &method, &uri, &headers, &body).await?;
    let payload: FriendLinkRequestPayload = decode(action, &body)?;

    let result = state
        .inbound
        .receive_friend_link_request(&signature, payload)
        .await;
    record_outcome(action, &result);

    Ok(ok(result?))
}

/// POST /api/federation/citations/request
async fn request_citation(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope<CitationRequestResult>, AppError> {
    let action = InboundAction::Citation;
    let signature = verify(&state, action, &method, &uri, &headers, &body).await?;
    let payload: CitationRequestPayload = decode(action, &body)?;

    let result = state.inbound.receive_citation(&signature, payload).await;
    record_outcome(action, &result);

    Ok(ok(result?))
}

/// POST /api/federation/mentions/notify
async fn notify_mention(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope<MentionNotifyResult>, AppError> {
    let action = InboundAction::Mention;
    let signature = verify(&state, action, &method, &uri, &headers, &body).await?;
    let payload: MentionNotifyPayload = decode(action, &body)?;

    let result = state.inbound.receive_mention(&signature, payload).await;
    record_outcome(action, &result);

    Ok(ok(result?))
}

async fn verify(
    state: &AppState,
    action: InboundAction,
    method: &Method,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<VerifiedSignature, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    match state
        .verifier
        .verify_request(method, path_and_query, headers, body)
        .await
    {
        Ok(signature) => Ok(signature),
        Err(error) => {
            SIGNATURE_FAILURES_TOTAL
                .with_label_values(&[error.reason()])
                .inc();
            FEDERATION_INBOUND_TOTAL
                .with_label_values(&[action.as_str(), "rejected"])
                .inc();

            let key_id = headers
                .get("signature")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_signature_header(value).ok())
                .map(|parsed| parsed.key_id)
                .unwrap_or_default();
            tracing::warn!(
                action = action.as_str(),
                reason = error.reason(),
                %error,
                key_id = %key_id,
                forwarded_for = header_str(headers, "x-forwarded-for"),
                user_agent = header_str(headers, "user-agent"),
                "Inbound federation signature rejected"
            );

            Err(AppError::Unauthorized(
                "signature verification failed".to_string(),
            ))
        }
    }
}

fn decode<T: DeserializeOwned>(action: InboundAction, body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        FEDERATION_INBOUND_TOTAL
            .with_label_values(&[action.as_str(), "rejected"])
            .inc();
        AppError::Validation(format!("invalid request body: {}", e))
    })
}

fn record_outcome<T>(action: InboundAction, result: &Result<T, AppError>) {
    let outcome = match result {
        Ok(_) => "accepted",
        Err(AppError::Unauthorized(_) | AppError::Validation(_) | AppError::NotFound) => {
            "rejected"
        }
        Err(_) => "error",
    };
    FEDERATION_INBOUND_TOTAL
        .with_label_values(&[action.as_str(), outcome])
        .inc();
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
}
