//! Inbound federation actions
//!
//! Runs a verified request through payload validation, the anti-spoof
//! check, policy gates, the peer lookup and persistence. Signature
//! verification happens in the handler because it needs the raw request.

use chrono::Utc;
use std::sync::Arc;

use crate::data::{
    ApplicationStatus, ContentRepository, Database, FederationConfig, FriendLinkRepository,
    IdentityRepository, NewFederatedCitation, NewFederatedMention,
    NewFriendLink, NewFriendLinkApplication,
};
use crate::error::AppError;
use crate::federation::{
    CitationRequestPayload, CitationRequestResult, DEFAULT_CITATION_TYPE, DEFAULT_MENTION_TYPE,
    FriendLinkRequestPayload, FriendLinkRequestResult, InboundAction, MentionNotifyPayload,
    MentionNotifyResult, Resolver, VerifiedSignature, authorize_inbound, fetch_peer_documents,
    normalize_base_url, same_base_url,
};

pub struct InboundService {
    db: Arc<Database>,
    resolver: Arc<Resolver>,
    content: Arc<dyn ContentRepository>,
    identity: Arc<dyn IdentityRepository>,
    friend_links: Arc<dyn FriendLinkRepository>,
}

impl InboundService {
    pub fn new(
        db: Arc<Database>,
        resolver: Arc<Resolver>,
        content: Arc<dyn ContentRepository>,
        identity: Arc<dyn IdentityRepository>,
        friend_links: Arc<dyn FriendLinkRepository>,
    ) -> Self {
        Self {
            db,
            resolver,
            content,
            identity,
            friend_links,
        }
    }

    pub async fn receive_friend_link_request(
        &self,
        signature: &VerifiedSignature,
        payload: FriendLinkRequestPayload,
    ) -> Result<FriendLinkRequestResult, AppError> {
        payload.validate()?;
        let requester_url = normalize_base_url(&payload.requester_url);
        check_origin(signature, &requester_url)?;

        let config = self.settings().await?;
        let policy = self.authorize(&config, signature, InboundAction::FriendLinkRequest)?;

        let documents = fetch_peer_documents(&self.resolver, &requester_url).await?;
        let manifest = &documents.manifest;

        let recorded = self
            .db
            .record_friend_link_request(
                &documents.snapshot(&requester_url),
                &NewFriendLinkApplication {
                    name: optional(&manifest.instance.name),
                    url: requester_url.clone(),
                    description: optional(&manifest.instance.description),
                    apply_channel: "federation".to_string(),
                    requested_sync_mode: "federation".to_string(),
                    rss_url: payload.rss_url.as_deref().and_then(optional),
                    instance_url: Some(requester_url.clone()),
                    manifest: documents.manifest_json(),
                    signature_key_id: Some(signature.key_id.clone()),
                    signature_verified: true,
                    message: payload.message.as_deref().and_then(optional),
                },
            )
            .await?;

        let mut application = recorded.application;
        let instance = recorded.instance;

        let message = if policy.auto_approve_friendlink() {
            self.db
                .accept_friend_link_application(
                    application.id,
                    instance.id,
                    &NewFriendLink {
                        name: instance
                            .name
                            .clone()
                            .unwrap_or_else(|| instance.base_url.clone()),
                        url: instance.base_url.clone(),
                        description: instance.description.clone(),
                        rss_url: application.rss_url.clone(),
                        kind: "federation".to_string(),
                        sync_mode: "federation".to_string(),
                        instance_id: Some(instance.id),
                        is_active: true,
                    },
                )
                .await?;
            application.status = ApplicationStatus::Approved.as_str().to_string();
            "approved"
        } else if recorded.existed {
            "updated"
        } else {
            "submitted"
        };

        tracing::info!(
            requester = %requester_url,
            application_id = application.id,
            status = %application.status,
            key_id = %signature.key_id,
            "Inbound friend link request recorded"
        );

        Ok(FriendLinkRequestResult {
            application_id: application.id,
            status: application.status,
            message: message.to_string(),
        })
    }

    pub async fn receive_citation(
        &self,
        signature: &VerifiedSignature,
        payload: CitationRequestPayload,
    ) -> Result<CitationRequestResult, AppError> {
        payload.validate()?;
        let source_url = normalize_base_url(&payload.source_instance_url);
        check_origin(signature, &source_url)?;

        let config = self.settings().await?;
        let policy = self.authorize(&config, signature, InboundAction::Citation)?;

        let target_post_id = payload.target_post_id.trim();
        let article = match target_post_id.parse::<i64>() {
            Ok(id) => self.content.get_article_by_id(id).await?,
            Err(_) => self.content.get_article_by_short_url(target_post_id).await?,
        }
        .filter(|article| article.is_published)
        .ok_or(AppError::NotFound)?;

        let documents = fetch_peer_documents(&self.resolver, &source_url).await?;

        let is_friend_link = self.friend_links.find_by_url(&source_url).await?.is_some();
        let status = policy.citation_status(is_friend_link);

        let citation_type = payload
            .citation_type
            .as_deref()
            .and_then(optional)
            .unwrap_or_else(|| DEFAULT_CITATION_TYPE.to_string());

        let (_, citation) = self
            .db
            .record_inbound_citation(
                &documents.snapshot(&source_url),
                &NewFederatedCitation {
                    source_post_url: payload.source_post.url.trim().to_string(),
                    source_post_title: payload.source_post.title.as_deref().and_then(optional),
                    target_article_id: article.id,
                    citation_context: payload.citation_context.as_deref().and_then(optional),
                    citation_type,
                    status,
                    requested_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(
            source = %source_url,
            target_post = %target_post_id,
            citation_id = citation.id,
            status = %citation.status,
            key_id = %signature.key_id,
            "Inbound citation recorded"
        );

        Ok(CitationRequestResult {
            citation_id: citation.id,
            status: citation.status,
        })
    }

    pub async fn receive_mention(
        &self,
        signature: &VerifiedSignature,
        payload: MentionNotifyPayload,
    ) -> Result<MentionNotifyResult, AppError> {
        payload.validate()?;
        let source_url = normalize_base_url(&payload.source_instance_url);
        check_origin(signature, &source_url)?;

        let config = self.settings().await?;
        self.authorize(&config, signature, InboundAction::Mention)?;

        let user = self
            .identity
            .find_by_username(payload.mentioned_user.trim())
            .await?
            .ok_or(AppError::NotFound)?;

        let documents = fetch_peer_documents(&self.resolver, &source_url).await?;

        let mention_type = payload
            .mention_type
            .as_deref()
            .and_then(optional)
            .unwrap_or_else(|| DEFAULT_MENTION_TYPE.to_string());

        let (_, mention) = self
            .db
            .record_inbound_mention(
                &documents.snapshot(&source_url),
                &NewFederatedMention {
                    source_post_url: payload.source_post.url.trim().to_string(),
                    source_post_title: payload.source_post.title.as_deref().and_then(optional),
                    mentioned_user_id: user.id,
                    mention_context: payload.mention_context,
                    mention_type,
                    created_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(
            source = %source_url,
            user = %user.username,
            mention_id = mention.id,
            key_id = %signature.key_id,
            "Inbound mention recorded"
        );

        Ok(MentionNotifyResult {
            mention_id: mention.id,
            delivered: true,
        })
    }

    async fn settings(&self) -> Result<FederationConfig, AppError> {
        Ok(self
            .db
            .get_federation_config()
            .await?
            .unwrap_or_else(FederationConfig::disabled))
    }

    fn authorize(
        &self,
        config: &FederationConfig,
        signature: &VerifiedSignature,
        action: InboundAction,
    ) -> Result<crate::federation::FederationPolicy, AppError> {
        let policy = authorize_inbound(config, action)?;
        if config.require_https && !is_https(&signature.base_url) {
            return Err(AppError::Unauthorized("https required".to_string()));
        }
        Ok(policy)
    }
}

/// Reject payloads claiming a different origin than the signer's key
fn check_origin(signature: &VerifiedSignature, claimed: &str) -> Result<(), AppError> {
    if !same_base_url(&signature.base_url, claimed) {
        tracing::warn!(
            key_id = %signature.key_id,
            claimed = %claimed,
            "Signature origin does not match payload"
        );
        return Err(AppError::Unauthorized(
            "signature origin does not match request".to_string(),
        ));
    }
    Ok(())
}

fn is_https(base_url: &str) -> bool {
    url::Url::parse(base_url).is_ok_and(|url| url.scheme() == "https")
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
