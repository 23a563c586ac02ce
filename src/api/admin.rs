//! Admin API endpoints
//!
//! Federation administration under `/admin/federation`.
//! All routes require the admin bearer token.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::response::{Envelope, ok};
use super::timeline::parse_time;
use crate::AppState;
use crate::data::{
    Article, CitationStatus, FederatedPostCache, FederationConfig, FederationInstance,
};
use crate::error::AppError;
use crate::federation::{
    CitationDetected, EndpointsDocument, Manifest, MentionDetected, OutboundResponse,
    PublicKeyDocument, ensure_federation_instance, fetch_peer_documents,
    publish_federation_signals,
};
use crate::service::FederationConfigUpdate;

/// Create admin router, nested under `/admin/federation`
///
/// Routes:
/// - POST /friendlinks/request - Propose a friend link to a peer
/// - POST /citations/request - Cite a remote post from a local article
/// - POST /mentions/notify - Notify a remote user of a mention
/// - POST /articles/:id/signals - Publish events for markers in content
/// - GET /remote/check - Fetch a peer's discovery documents
/// - GET /instances - List known instances
/// - POST /instances - Register or refresh a peer from its documents
/// - POST /instances/:id/sync - Pull a peer's timeline into the cache
/// - POST /instances/:id/refresh - Refetch a peer's documents, bypassing the cache
/// - GET /instances/:id/posts - List a peer's cached timeline entries
/// - POST /citations/:id/approve
/// - POST /citations/:id/reject
/// - POST /mentions/:id/read
/// - GET /config, PUT /config
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/friendlinks/request", post(request_friend_link))
        .route("/citations/request", post(request_citation))
        .route("/mentions/notify", post(notify_mention))
        .route("/articles/:id/signals", post(publish_signals))
        .route("/remote/check", get(check_remote))
        .route("/instances", get(list_instances).post(register_instance))
        .route("/instances/:id/sync", post(sync_instance))
        .route("/instances/:id/refresh", post(refresh_instance))
        .route("/instances/:id/posts", get(list_instance_posts))
        .route("/citations/:id/approve", post(approve_citation))
        .route("/citations/:id/reject", post(reject_citation))
        .route("/mentions/:id/read", post(mark_mention_read))
        .route("/config", get(get_config).put(update_config))
}

/// Peer answer relayed to the admin caller
#[derive(Debug, Serialize)]
pub struct ProxyResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl From<OutboundResponse> for ProxyResponse {
    fn from(response: OutboundResponse) -> Self {
        let body = serde_json::from_str(&response.body)
            .unwrap_or(serde_json::Value::String(response.body));
        Self {
            status_code: response.status.as_u16(),
            body,
        }
    }
}

// =============================================================================
// Outbound actions
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FriendLinkRequestBody {
    pub target_url: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub rss_url: Option<String>,
}

/// POST /admin/federation/friendlinks/request
async fn request_friend_link(
    State(state): State<AppState>,
    Json(body): Json<FriendLinkRequestBody>,
) -> Result<Envelope<ProxyResponse>, AppError> {
    let target = required("target_url", &body.target_url)?;
    let response = state
        .outbound
        .send_friend_link_request(target, body.message, body.rss_url)
        .await?;
    Ok(ok(response.into()))
}

/// Local article a citation or mention is sent from
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceArticle {
    pub source_article_id: Option<i64>,
    pub source_short_url: Option<String>,
}

impl SourceArticle {
    async fn load(&self, state: &AppState) -> Result<Article, AppError> {
        let article = match (self.source_article_id, self.source_short_url.as_deref()) {
            (Some(id), _) => state.content.get_article_by_id(id).await?,
            (None, Some(short_url)) if !short_url.trim().is_empty() => {
                state.content.get_article_by_short_url(short_url.trim()).await?
            }
            _ => {
                return Err(AppError::Validation(
                    "source_article_id or source_short_url is required".to_string(),
                ));
            }
        };
        article.ok_or(AppError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
pub struct CitationRequestBody {
    pub target_instance_url: String,
    pub target_post_id: String,
    #[serde(flatten)]
    pub source: SourceArticle,
    #[serde(default)]
    pub citation_context: Option<String>,
    #[serde(default)]
    pub citation_type: Option<String>,
}

/// POST /admin/federation/citations/request
///
/// Context defaults to the article summary.
async fn request_citation(
    State(state): State<AppState>,
    Json(body): Json<CitationRequestBody>,
) -> Result<Envelope<ProxyResponse>, AppError> {
    let target_instance = required("target_instance_url", &body.target_instance_url)?;
    let target_post_id = required("target_post_id", &body.target_post_id)?;
    let article = body.source.load(&state).await?;

    let event = CitationDetected {
        article_id: article.id,
        author_id: article.author_id,
        title: article.title.clone(),
        short_url: article.short_url.clone(),
        target_instance: target_instance.to_string(),
        target_post_id: target_post_id.to_string(),
        context: context_or_summary(body.citation_context, &article),
        citation_type: body.citation_type,
        detected_at: chrono::Utc::now(),
    };

    let response = state.outbound.send_citation(&event).await?;
    Ok(ok(response.into()))
}

#[derive(Debug, Deserialize)]
pub struct MentionNotifyBody {
    pub target_instance_url: String,
    pub mentioned_user: String,
    #[serde(flatten)]
    pub source: SourceArticle,
    #[serde(default)]
    pub mention_context: Option<String>,
    #[serde(default)]
    pub mention_type: Option<String>,
}

/// POST /admin/federation/mentions/notify
async fn notify_mention(
    State(state): State<AppState>,
    Json(body): Json<MentionNotifyBody>,
) -> Result<Envelope<ProxyResponse>, AppError> {
    let target_instance = required("target_instance_url", &body.target_instance_url)?;
    let mentioned_user = required("mentioned_user", &body.mentioned_user)?;
    let article = body.source.load(&state).await?;

    let event = MentionDetected {
        article_id: article.id,
        author_id: article.author_id,
        title: article.title.clone(),
        short_url: article.short_url.clone(),
        target_instance: target_instance.to_string(),
        mentioned_user: mentioned_user.to_string(),
        context: context_or_summary(body.mention_context, &article),
        mention_type: body.mention_type,
        detected_at: chrono::Utc::now(),
    };

    let response = state.outbound.send_mention(&event).await?;
    Ok(ok(response.into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PublishSignalsBody {
    /// Article text to scan; defaults to the lead-in and summary
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishSignalsResult {
    pub mentions: usize,
    pub citations: usize,
}

/// POST /admin/federation/articles/:id/signals
///
/// Sends happen asynchronously on the event subscriber.
async fn publish_signals(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<PublishSignalsBody>,
) -> Result<Envelope<PublishSignalsResult>, AppError> {
    let article = state
        .content
        .get_article_by_id(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let content = body.content.unwrap_or_else(|| {
        [article.lead_in.as_deref().unwrap_or_default(), article.summary.as_str()].join("\n")
    });

    let (mentions, citations) = publish_federation_signals(&state.events, &article, &content);
    tracing::info!(article_id = article.id, mentions, citations, "Federation signals published");

    Ok(ok(PublishSignalsResult {
        mentions,
        citations,
    }))
}

// =============================================================================
// Remote instances
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RemoteCheckQuery {
    pub target_url: String,
}

#[derive(Debug, Serialize)]
pub struct RemoteCheckResult {
    pub base_url: String,
    pub manifest: Manifest,
    pub endpoints: EndpointsDocument,
    pub public_key: PublicKeyDocument,
}

/// GET /admin/federation/remote/check?target_url=
async fn check_remote(
    State(state): State<AppState>,
    Query(query): Query<RemoteCheckQuery>,
) -> Result<Envelope<RemoteCheckResult>, AppError> {
    let target = required("target_url", &query.target_url)?;
    let base_url = state.outbound.resolve_target_base_url(target).await?;
    let documents = fetch_peer_documents(&state.resolver, &base_url).await?;

    Ok(ok(RemoteCheckResult {
        base_url,
        manifest: documents.manifest,
        endpoints: documents.endpoints,
        public_key: documents.public_key,
    }))
}

/// GET /admin/federation/instances
async fn list_instances(
    State(state): State<AppState>,
) -> Result<Envelope<Vec<FederationInstance>>, AppError> {
    Ok(ok(state.db.list_federation_instances().await?))
}

#[derive(Debug, Deserialize)]
pub struct RegisterInstanceBody {
    pub target_url: String,
}

/// POST /admin/federation/instances
///
/// New instances start `pending`; a known instance keeps its status.
async fn register_instance(
    State(state): State<AppState>,
    Json(body): Json<RegisterInstanceBody>,
) -> Result<Envelope<FederationInstance>, AppError> {
    let target = required("target_url", &body.target_url)?;
    let base_url = state.outbound.resolve_target_base_url(target).await?;
    let instance = ensure_federation_instance(&state.db, &state.resolver, &base_url).await?;

    tracing::info!(instance = %instance.base_url, id = instance.id, "Federation instance registered");
    Ok(ok(instance))
}

#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub instance_id: i64,
    pub synced: usize,
}

/// POST /admin/federation/instances/:id/sync
async fn sync_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Envelope<SyncResult>, AppError> {
    let instance = state
        .db
        .get_federation_instance(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let synced = state.outbound.sync_timeline(&instance).await?;
    Ok(ok(SyncResult {
        instance_id: instance.id,
        synced,
    }))
}

/// POST /admin/federation/instances/:id/refresh
///
/// Drops the cached documents first so a rotated key is picked up.
async fn refresh_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Envelope<FederationInstance>, AppError> {
    let instance = state
        .db
        .get_federation_instance(id)
        .await?
        .ok_or(AppError::NotFound)?;

    state.metadata_cache.invalidate(&instance.base_url).await;
    let refreshed =
        ensure_federation_instance(&state.db, &state.resolver, &instance.base_url).await?;

    tracing::info!(instance = %refreshed.base_url, id = refreshed.id, "Federation instance refreshed");
    Ok(ok(refreshed))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstancePostsQuery {
    pub since: Option<String>,
    pub limit: Option<i64>,
}

/// GET /admin/federation/instances/:id/posts
async fn list_instance_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<InstancePostsQuery>,
) -> Result<Envelope<Vec<FederatedPostCache>>, AppError> {
    let since = parse_time("since", query.since.as_deref())?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);

    state
        .db
        .get_federation_instance(id)
        .await?
        .ok_or(AppError::NotFound)?;

    let posts = state
        .db
        .list_federated_posts_by_instance(id, since, limit)
        .await?;
    Ok(ok(posts))
}

// =============================================================================
// Moderation
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ModerationResult {
    pub id: i64,
    pub status: String,
}

/// POST /admin/federation/citations/:id/approve
async fn approve_citation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Envelope<ModerationResult>, AppError> {
    moderate_citation(&state, id, CitationStatus::Approved, None).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RejectBody {
    pub reason: Option<String>,
}

/// POST /admin/federation/citations/:id/reject
async fn reject_citation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<RejectBody>>,
) -> Result<Envelope<ModerationResult>, AppError> {
    let reason = body.and_then(|Json(body)| body.reason);
    let reason = reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    moderate_citation(&state, id, CitationStatus::Rejected, reason).await
}

/// Terminal states never change; a second decision is a validation error
async fn moderate_citation(
    state: &AppState,
    id: i64,
    status: CitationStatus,
    reason: Option<&str>,
) -> Result<Envelope<ModerationResult>, AppError> {
    let citation = state
        .db
        .get_federated_citation(id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !state.db.update_citation_status(id, status, reason).await? {
        return Err(AppError::Validation(format!(
            "citation is already {}",
            citation.status
        )));
    }

    tracing::info!(citation_id = id, status = status.as_str(), "Citation moderated");
    Ok(ok(ModerationResult {
        id,
        status: status.as_str().to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MentionReadResult {
    pub id: i64,
    pub is_read: bool,
}

/// POST /admin/federation/mentions/:id/read
///
/// Idempotent: marking a read mention again succeeds.
async fn mark_mention_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Envelope<MentionReadResult>, AppError> {
    if state.db.get_federated_mention(id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    state.db.mark_mention_read(id).await?;

    Ok(ok(MentionReadResult { id, is_read: true }))
}

// =============================================================================
// Config
// =============================================================================

/// GET /admin/federation/config
///
/// The private key is never serialized.
async fn get_config(
    State(state): State<AppState>,
) -> Result<Envelope<FederationConfig>, AppError> {
    Ok(ok(state.federation_config.settings().await?))
}

/// PUT /admin/federation/config
async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<FederationConfigUpdate>,
) -> Result<Envelope<FederationConfig>, AppError> {
    Ok(ok(state.federation_config.update(update).await?))
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

fn context_or_summary(context: Option<String>, article: &Article) -> String {
    context
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| article.summary.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn proxy_response_keeps_non_json_body() {
        let json: ProxyResponse = OutboundResponse {
            status: StatusCode::OK,
            body: r#"{"code":0}"#.to_string(),
        }
        .into();
        assert_eq!(json.status_code, 200);
        assert_eq!(json.body["code"], 0);

        let text: ProxyResponse = OutboundResponse {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        }
        .into();
        assert_eq!(text.status_code, 502);
        assert_eq!(text.body, serde_json::json!("upstream down"));
    }

    #[test]
    fn source_article_fields_flatten_into_body() {
        let body: CitationRequestBody = serde_json::from_value(serde_json::json!({
            "target_instance_url": "https://peer.example",
            "target_post_id": "42",
            "source_short_url": "hello-world"
        }))
        .unwrap();

        assert_eq!(body.source.source_article_id, None);
        assert_eq!(body.source.source_short_url.as_deref(), Some("hello-world"));
        assert!(body.citation_context.is_none());
    }
}
