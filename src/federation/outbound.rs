//! Outbound federation
//!
//! Builds, signs and sends friend link requests, citation requests and
//! mention notifications. Every send resolves its target afresh and signs
//! with a signer built for that send only. Nothing is retried.

use chrono::Utc;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::error::FederationError;
use super::events::{CitationDetected, MentionDetected};
use super::payload::{
    CitationRequestPayload, CitationSourcePost, FederationPost, FriendLinkRequestPayload,
    MentionNotifyPayload, MentionSourcePost, TimelinePage,
};
use super::resolver::{Resolver, normalize_base_url, origin_of};
use super::signature::Signer;
use super::types::{EndpointsDocument, PUBLIC_KEY_FILE, WELL_KNOWN_PREFIX};
use crate::data::{Database, FederatedPostCache, FederationConfig, FederationInstance};
use crate::error::AppError;
use crate::metrics::{FEDERATION_OUTBOUND_DURATION_SECONDS, FEDERATION_OUTBOUND_TOTAL};

/// Default citation type when the event carries none
pub const DEFAULT_CITATION_TYPE: &str = "reference";
/// Default mention type when the event carries none
pub const DEFAULT_MENTION_TYPE: &str = "discussion";

/// Entries requested per timeline sync
const TIMELINE_SYNC_PAGE_SIZE: u32 = 50;

/// Remote endpoints we call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundAction {
    FriendLinkRequest,
    Citation,
    Mention,
    Timeline,
}

impl OutboundAction {
    /// Key in the peer's `endpoints.json`
    pub fn endpoint_key(&self) -> &'static str {
        match self {
            Self::FriendLinkRequest => "friendlink_request",
            Self::Citation => "citation_request",
            Self::Mention => "mention_notify",
            Self::Timeline => "timeline",
        }
    }

    /// Path used when the peer does not declare the endpoint
    pub fn default_path(&self) -> &'static str {
        match self {
            Self::FriendLinkRequest => "/api/federation/friendlinks/request",
            Self::Citation => "/api/federation/citations/request",
            Self::Mention => "/api/federation/mentions/notify",
            Self::Timeline => "/api/federation/timeline/posts",
        }
    }
}

/// Status and raw body returned by the peer
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Everything needed to sign one request as this instance
struct SigningContext {
    instance_url: String,
    key_id: String,
    signer: Signer,
    require_https: bool,
}

pub struct OutboundService {
    db: Arc<Database>,
    resolver: Arc<Resolver>,
    http_client: Arc<reqwest::Client>,
}

impl OutboundService {
    pub fn new(
        db: Arc<Database>,
        resolver: Arc<Resolver>,
        http_client: Arc<reqwest::Client>,
    ) -> Self {
        Self {
            db,
            resolver,
            http_client,
        }
    }

    /// Propose a friend link to `target`
    ///
    /// # Arguments
    /// * `target` - Base URL or bare `host[:port]` of the peer
    /// * `message` - Optional note for the peer's admin
    /// * `rss_url` - Optional feed of this blog
    pub async fn send_friend_link_request(
        &self,
        target: &str,
        message: Option<String>,
        rss_url: Option<String>,
    ) -> Result<OutboundResponse, AppError> {
        let action = OutboundAction::FriendLinkRequest;
        let endpoint = self.resolve_endpoint(target, action).await?;
        let context = self.signing_context().await?;

        let payload = FriendLinkRequestPayload {
            requester_url: context.instance_url.clone(),
            message: non_empty(message),
            rss_url: non_empty(rss_url),
        };

        self.post_signed(action, target, &endpoint, &context, &payload)
            .await
    }

    pub async fn send_citation(
        &self,
        event: &CitationDetected,
    ) -> Result<OutboundResponse, AppError> {
        let action = OutboundAction::Citation;
        let endpoint = self
            .resolve_endpoint(&event.target_instance, action)
            .await?;
        let context = self.signing_context().await?;

        let payload = CitationRequestPayload {
            source_instance_url: context.instance_url.clone(),
            source_post: CitationSourcePost {
                id: Some(event.short_url.clone()),
                url: post_url(&context.instance_url, &event.short_url),
                title: Some(event.title.clone()),
            },
            target_post_id: event.target_post_id.clone(),
            citation_context: non_empty(Some(event.context.clone())),
            citation_type: Some(
                non_empty(event.citation_type.clone())
                    .unwrap_or_else(|| DEFAULT_CITATION_TYPE.to_string()),
            ),
        };

        self.post_signed(action, &event.target_instance, &endpoint, &context, &payload)
            .await
    }

    pub async fn send_mention(&self, event: &MentionDetected) -> Result<OutboundResponse, AppError> {
        let action = OutboundAction::Mention;
        let endpoint = self
            .resolve_endpoint(&event.target_instance, action)
            .await?;
        let context = self.signing_context().await?;

        let payload = MentionNotifyPayload {
            source_instance_url: context.instance_url.clone(),
            source_post: MentionSourcePost {
                url: post_url(&context.instance_url, &event.short_url),
                title: Some(event.title.clone()),
            },
            mentioned_user: event.mentioned_user.clone(),
            mention_context: event.context.clone(),
            mention_type: Some(
                non_empty(event.mention_type.clone())
                    .unwrap_or_else(|| DEFAULT_MENTION_TYPE.to_string()),
            ),
        };

        self.post_signed(action, &event.target_instance, &endpoint, &context, &payload)
            .await
    }

    /// Pull a peer's public timeline into the remote post cache
    ///
    /// # Returns
    /// Number of entries cached
    pub async fn sync_timeline(&self, instance: &FederationInstance) -> Result<usize, AppError> {
        let action = OutboundAction::Timeline;
        let config = self
            .db
            .get_federation_config()
            .await?
            .unwrap_or_else(FederationConfig::disabled);
        if !config.enabled || !config.allow_outbound {
            return Err(FederationError::OutboundDisabled(
                "federation outbound disabled".to_string(),
            )
            .into());
        }

        let endpoint = self.resolve_endpoint(&instance.base_url, action).await?;
        check_https(&endpoint, config.require_https)?;

        let per_page = TIMELINE_SYNC_PAGE_SIZE.to_string();
        let started = Instant::now();
        let response = self
            .http_client
            .get(endpoint.as_str())
            .query(&[("page", "1"), ("per_page", per_page.as_str())])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .inspect_err(|_| record_outcome(action, "error", started))?;

        let status = response.status();
        if !status.is_success() {
            record_outcome(action, "rejected", started);
            return Err(FederationError::Discovery {
                url: endpoint.to_string(),
                reason: format!("HTTP {}", status),
            }
            .into());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .inspect_err(|_| record_outcome(action, "error", started))?;
        let page = decode_timeline(body).map_err(|reason| {
            record_outcome(action, "error", started);
            FederationError::Discovery {
                url: endpoint.to_string(),
                reason,
            }
        })?;

        let cached_at = Utc::now();
        let rows: Vec<FederatedPostCache> = page
            .items
            .into_iter()
            .filter(|post| !post.url.trim().is_empty())
            .map(|post| cache_row(instance.id, post, cached_at))
            .collect();

        self.db.upsert_federated_posts(&rows).await?;
        record_outcome(action, "success", started);

        tracing::info!(
            instance = %instance.base_url,
            posts = rows.len(),
            "Federated timeline synced"
        );

        Ok(rows.len())
    }

    /// Turn a logical target into the peer's base URL
    ///
    /// Full `http(s)://` URLs are used as given. A bare `host[:port]` reuses
    /// the base URL of a matching active instance, else becomes
    /// `https://{target}`.
    pub async fn resolve_target_base_url(&self, target: &str) -> Result<String, AppError> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(FederationError::InvalidTarget("target instance is empty".to_string()).into());
        }
        if has_http_scheme(trimmed) {
            return Ok(normalize_base_url(trimmed));
        }

        let bare = trimmed.trim_end_matches('/');
        if let Ok(parsed) = url::Url::parse(&format!("http://{}", bare)) {
            if let Some(host) = parsed.host_str() {
                let instances = self.db.list_active_federation_instances().await?;
                if let Some(found) = instances
                    .iter()
                    .find(|instance| matches_host_port(&instance.base_url, host, parsed.port()))
                {
                    return Ok(normalize_base_url(&found.base_url));
                }
            }
        }

        Ok(format!("https://{}", bare))
    }

    async fn resolve_endpoint(
        &self,
        target: &str,
        action: OutboundAction,
    ) -> Result<url::Url, AppError> {
        let base_url = self.resolve_target_base_url(target).await?;
        let endpoints = self.resolver.fetch_endpoints(&base_url).await?;
        Ok(endpoint_url(&base_url, &endpoints, action)?)
    }

    async fn signing_context(&self) -> Result<SigningContext, AppError> {
        let config = self
            .db
            .get_federation_config()
            .await?
            .unwrap_or_else(FederationConfig::disabled);

        if !config.enabled || !config.allow_outbound {
            return Err(
                FederationError::OutboundDisabled("federation outbound disabled".to_string()).into(),
            );
        }
        let instance_url = config
            .instance_url()
            .ok_or_else(|| FederationError::OutboundDisabled("instance_url not configured".to_string()))?
            .to_string();
        let private_key = config
            .private_key()
            .ok_or_else(|| FederationError::OutboundDisabled("private key not configured".to_string()))?;

        let signer = Signer::new(&config.signature_alg, private_key)?;
        let key_id = format!("{}{}/{}", instance_url, WELL_KNOWN_PREFIX, PUBLIC_KEY_FILE);

        Ok(SigningContext {
            instance_url,
            key_id,
            signer,
            require_https: config.require_https,
        })
    }

    async fn post_signed<T: Serialize>(
        &self,
        action: OutboundAction,
        target: &str,
        endpoint: &url::Url,
        context: &SigningContext,
        payload: &T,
    ) -> Result<OutboundResponse, AppError> {
        let name = action.endpoint_key();
        check_https(endpoint, context.require_https)?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode payload: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        context
            .signer
            .sign_request(&Method::POST, endpoint, &mut headers, &body, &context.key_id)?;

        let started = Instant::now();
        let response = match self
            .http_client
            .post(endpoint.as_str())
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                record_outcome(action, "error", started);
                tracing::error!(action = name, %target, %endpoint, %error, "Outbound federation request failed");
                return Err(error.into());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(action = name, %target, %endpoint, %error, "Failed to read outbound response body");
                String::new()
            }
        };
        record_outcome(
            action,
            if status.is_success() { "success" } else { "rejected" },
            started,
        );

        tracing::info!(
            action = name,
            %target,
            %endpoint,
            status = status.as_u16(),
            "Outbound federation request sent"
        );

        Ok(OutboundResponse { status, body })
    }
}

/// Absolute URL of `action` on a peer
///
/// A declared endpoint is used as-is when absolute and otherwise joined to
/// the document's `base_url`. Undeclared endpoints fall back to the
/// default path on the peer's origin.
pub fn endpoint_url(
    base_url: &str,
    endpoints: &EndpointsDocument,
    action: OutboundAction,
) -> Result<url::Url, FederationError> {
    let declared = endpoints
        .endpoints
        .get(action.endpoint_key())
        .map(|path| path.trim())
        .filter(|path| !path.is_empty());

    let joined = match declared {
        Some(path) if has_http_scheme(path) => path.to_string(),
        Some(path) => {
            let base = endpoints.base_url.trim();
            if base.is_empty() {
                return Err(FederationError::InvalidTarget(
                    "endpoints.base_url is empty".to_string(),
                ));
            }
            if !has_http_scheme(base) {
                return Err(FederationError::InvalidTarget(format!(
                    "endpoints.base_url must include scheme: {}",
                    base
                )));
            }
            join_path(base, path)
        }
        None => {
            let origin = url::Url::parse(base_url)
                .map(|parsed| origin_of(&parsed))
                .map_err(|_| FederationError::InvalidTarget(base_url.to_string()))?;
            join_path(&origin, action.default_path())
        }
    };

    url::Url::parse(&joined).map_err(|_| FederationError::InvalidTarget(joined))
}

fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

fn has_http_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn matches_host_port(base_url: &str, host: &str, port: Option<u16>) -> bool {
    let Ok(parsed) = url::Url::parse(base_url.trim()) else {
        return false;
    };
    let Some(instance_host) = parsed.host_str() else {
        return false;
    };

    instance_host.eq_ignore_ascii_case(host)
        && port.is_none_or(|port| parsed.port_or_known_default() == Some(port))
}

fn check_https(endpoint: &url::Url, require_https: bool) -> Result<(), FederationError> {
    if require_https && endpoint.scheme() != "https" {
        return Err(FederationError::InvalidTarget(format!(
            "https required for {}",
            endpoint
        )));
    }
    Ok(())
}

fn post_url(instance_url: &str, short_url: &str) -> String {
    format!("{}/posts/{}", instance_url.trim_end_matches('/'), short_url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn record_outcome(action: OutboundAction, outcome: &str, started: Instant) {
    let name = action.endpoint_key();
    FEDERATION_OUTBOUND_TOTAL
        .with_label_values(&[name, outcome])
        .inc();
    FEDERATION_OUTBOUND_DURATION_SECONDS
        .with_label_values(&[name])
        .observe(started.elapsed().as_secs_f64());
}

/// Accept either a bare timeline page or one wrapped in a response envelope
fn decode_timeline(body: serde_json::Value) -> Result<TimelinePage, String> {
    let page = match body {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(page).map_err(|e| format!("invalid timeline: {}", e))
}

fn cache_row(
    instance_id: i64,
    post: FederationPost,
    cached_at: chrono::DateTime<Utc>,
) -> FederatedPostCache {
    FederatedPostCache {
        id: 0,
        instance_id,
        remote_post_id: Some(post.id),
        author: serde_json::to_string(&post.author).unwrap_or_else(|_| "{}".to_string()),
        tags: serde_json::to_string(&post.tags).unwrap_or_else(|_| "[]".to_string()),
        categories: serde_json::to_string(&post.categories).unwrap_or_else(|_| "[]".to_string()),
        url: post.url,
        title: post.title,
        summary: Some(post.summary).filter(|s| !s.is_empty()),
        content_preview: post.content_preview,
        published_at: Some(post.published_at),
        updated_at: post.updated_at,
        cover_image: post.cover_image,
        language: post.language,
        allow_citation: post.allow_citation,
        allow_comment: post.allow_comment,
        etag: None,
        last_modified: None,
        cached_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn endpoints(base_url: &str, entries: &[(&str, &str)]) -> EndpointsDocument {
        EndpointsDocument {
            base_url: base_url.to_string(),
            endpoints: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn declared_path_joins_endpoints_base_url() {
        let doc = endpoints(
            "https://peer.example/api/federation/",
            &[("citation_request", "citations/request")],
        );
        let url = endpoint_url("https://peer.example", &doc, OutboundAction::Citation).unwrap();
        assert_eq!(
            url.as_str(),
            "https://peer.example/api/federation/citations/request"
        );
    }

    #[test]
    fn absolute_endpoint_is_used_as_is() {
        let doc = endpoints("", &[("mention_notify", "https://inbox.peer.example/notify")]);
        let url = endpoint_url("https://peer.example", &doc, OutboundAction::Mention).unwrap();
        assert_eq!(url.as_str(), "https://inbox.peer.example/notify");
    }

    #[test]
    fn missing_endpoint_falls_back_to_default_path() {
        let doc = endpoints("https://peer.example/api/federation", &[]);
        let url =
            endpoint_url("https://peer.example:8443", &doc, OutboundAction::FriendLinkRequest)
                .unwrap();
        assert_eq!(
            url.as_str(),
            "https://peer.example:8443/api/federation/friendlinks/request"
        );
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let doc = endpoints("peer.example/api", &[("timeline", "/timeline/posts")]);
        match endpoint_url("https://peer.example", &doc, OutboundAction::Timeline) {
            Err(FederationError::InvalidTarget(msg)) => assert!(msg.contains("scheme")),
            other => panic!("expected invalid target, got: {other:?}"),
        }

        let doc = endpoints("  ", &[("timeline", "/timeline/posts")]);
        assert!(endpoint_url("https://peer.example", &doc, OutboundAction::Timeline).is_err());
    }

    #[test]
    fn host_port_matching() {
        assert!(matches_host_port("https://Peer.example", "peer.example", None));
        assert!(matches_host_port("https://peer.example", "peer.example", Some(443)));
        assert!(matches_host_port("http://127.0.0.1:8080", "127.0.0.1", Some(8080)));
        assert!(!matches_host_port("http://127.0.0.1:8080", "127.0.0.1", Some(9090)));
        assert!(!matches_host_port("https://other.example", "peer.example", None));
    }

    #[test]
    fn https_requirement() {
        let plain = url::Url::parse("http://peer.example/api").unwrap();
        assert!(check_https(&plain, true).is_err());
        assert!(check_https(&plain, false).is_ok());
    }

    #[test]
    fn timeline_decodes_bare_and_enveloped() {
        let page = serde_json::json!({
            "items": [{
                "id": "1",
                "url": "https://peer.example/posts/1",
                "title": "Hello",
                "published_at": "2024-01-01T00:00:00Z"
            }],
            "total": 1,
            "page": 1,
            "per_page": 20
        });

        let bare = decode_timeline(page.clone()).unwrap();
        assert_eq!(bare.items.len(), 1);

        let wrapped = decode_timeline(serde_json::json!({"code": 0, "data": page})).unwrap();
        assert_eq!(wrapped.items[0].title, "Hello");

        let row = cache_row(9, wrapped.items[0].clone(), Utc::now());
        assert_eq!(row.instance_id, 9);
        assert_eq!(row.remote_post_id.as_deref(), Some("1"));
        assert_eq!(row.summary, None);
        assert_eq!(row.tags, "[]");
    }
}
