//! Well-known discovery endpoints
//!
//! - /.well-known/blog-federation/manifest.json
//! - /.well-known/blog-federation/public-key.json
//! - /.well-known/blog-federation/endpoints.json
//!
//! Documents are served bare (no envelope) so that peers can decode them
//! directly. All three answer 404 while federation is disabled.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use std::collections::BTreeMap;

use crate::AppState;
use crate::data::FederationConfig;
use crate::error::AppError;
use crate::federation::{
    ENDPOINTS_FILE, EndpointsDocument, MANIFEST_FILE, Manifest, ManifestInstance,
    ManifestPolicies, ManifestRateLimits, ManifestSoftware, PROTOCOL_VERSION, PUBLIC_KEY_FILE,
    PublicKeyDocument, WELL_KNOWN_PREFIX,
};

/// Advertised `max_cache_age` in seconds
const MAX_CACHE_AGE_SECS: i64 = 86_400;

/// Create well-known router
pub fn wellknown_router() -> Router<AppState> {
    Router::new()
        .route(&format!("{}/{}", WELL_KNOWN_PREFIX, MANIFEST_FILE), get(manifest))
        .route(&format!("{}/{}", WELL_KNOWN_PREFIX, PUBLIC_KEY_FILE), get(public_key))
        .route(&format!("{}/{}", WELL_KNOWN_PREFIX, ENDPOINTS_FILE), get(endpoints))
}

/// Settings if federation is enabled
async fn enabled_settings(state: &AppState) -> Result<Option<FederationConfig>, AppError> {
    let settings = state.federation_config.settings().await?;
    Ok(settings.enabled.then_some(settings))
}

fn instance_url(state: &AppState, settings: &FederationConfig) -> String {
    settings
        .instance_url()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| state.config.default_instance_url())
}

/// GET /.well-known/blog-federation/manifest.json
async fn manifest(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(settings) = enabled_settings(&state).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let policy = settings.policy();
    let mut features = vec!["friendlink-timeline".to_string(), "related-posts".to_string()];
    if policy.allow_citation() {
        features.push("cross-citation".to_string());
    }
    if policy.allow_mention() {
        features.push("cross-mention".to_string());
    }

    let rate_limits: ManifestRateLimits =
        serde_json::from_str(&settings.rate_limits).unwrap_or_default();

    let manifest = Manifest {
        protocol_version: PROTOCOL_VERSION.to_string(),
        instance: ManifestInstance {
            name: settings
                .instance_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            url: instance_url(&state, &settings),
            ..Default::default()
        },
        software: ManifestSoftware {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        admin: None,
        features,
        policies: ManifestPolicies {
            allow_citation: policy.allow_citation(),
            allow_mention: policy.allow_mention(),
            auto_approve_friendlink_citation: policy.auto_approve_friendlink_citation(),
            require_https: settings.require_https,
            max_cache_age: MAX_CACHE_AGE_SECS,
        },
        rate_limits,
        rss_feeds: Vec::new(),
        created_at: settings.created_at,
        updated_at: settings.updated_at,
    };

    Ok(Json(manifest).into_response())
}

/// GET /.well-known/blog-federation/public-key.json
///
/// 404 when no key is configured.
async fn public_key(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(settings) = enabled_settings(&state).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let Some(public_key) = settings.public_key() else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let document = PublicKeyDocument {
        key_id: format!(
            "{}{}/{}",
            instance_url(&state, &settings),
            WELL_KNOWN_PREFIX,
            PUBLIC_KEY_FILE
        ),
        algorithm: settings.signature_alg.clone(),
        public_key: public_key.to_string(),
        created_at: settings.updated_at,
        expires_at: None,
    };

    Ok(Json(document).into_response())
}

/// GET /.well-known/blog-federation/endpoints.json
async fn endpoints(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(settings) = enabled_settings(&state).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let endpoints: BTreeMap<String, String> = [
        ("friendlink_request", "/friendlinks/request"),
        ("timeline", "/timeline/posts"),
        ("post_detail", "/posts/{id}"),
        ("citation_request", "/citations/request"),
        ("mention_notify", "/mentions/notify"),
    ]
    .into_iter()
    .map(|(key, path)| (key.to_string(), path.to_string()))
    .collect();

    let document = EndpointsDocument {
        base_url: format!("{}/api/federation", instance_url(&state, &settings)),
        endpoints,
    };

    Ok(Json(document).into_response())
}
