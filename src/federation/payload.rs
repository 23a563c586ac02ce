//! Wire payloads for the signed actions and the public read endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_http_url(value: &str, field: &str) -> Result<(), AppError> {
    require(value, field)?;
    match url::Url::parse(value.trim()) {
        Ok(parsed)
            if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() =>
        {
            Ok(())
        }
        _ => Err(AppError::Validation(format!(
            "{} must be an absolute http(s) URL",
            field
        ))),
    }
}

// ---------------------------------------------------------------------------
// Friend link
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendLinkRequestPayload {
    pub requester_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_url: Option<String>,
}

impl FriendLinkRequestPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        require_http_url(&self.requester_url, "requester_url")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendLinkRequestResult {
    pub application_id: i64,
    pub status: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Citation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationSourcePost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationRequestPayload {
    pub source_instance_url: String,
    pub source_post: CitationSourcePost,
    pub target_post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_type: Option<String>,
}

impl CitationRequestPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        require_http_url(&self.source_instance_url, "source_instance_url")?;
        require(&self.source_post.url, "source_post.url")?;
        require(&self.target_post_id, "target_post_id")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationRequestResult {
    pub citation_id: i64,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Mention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionSourcePost {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionNotifyPayload {
    pub source_instance_url: String,
    pub source_post: MentionSourcePost,
    pub mentioned_user: String,
    pub mention_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<String>,
}

impl MentionNotifyPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        require_http_url(&self.source_instance_url, "source_instance_url")?;
        require(&self.source_post.url, "source_post.url")?;
        require(&self.mentioned_user, "mentioned_user")?;
        require(&self.mention_context, "mention_context")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionNotifyResult {
    pub mention_id: i64,
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Timeline and post detail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A post as exposed to other instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationPost {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    #[serde(default)]
    pub author: PostAuthor,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub allow_citation: bool,
    #[serde(default)]
    pub allow_comment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePage {
    pub items: Vec<FederationPost>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: FederationPost,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_posts: Vec<FederationPost>,
}
