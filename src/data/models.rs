//! Data models
//!
//! Rust structs representing database entities.
//! IDs are SQLite rowids and timestamps use chrono.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::federation::FederationPolicy;

// =============================================================================
// Federation config (single row)
// =============================================================================

/// Federation settings of this instance
///
/// Exactly one row exists once the application has started.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederationConfig {
    pub id: i64,
    pub enabled: bool,
    pub instance_name: Option<String>,
    /// Public base URL peers use to reach us
    pub instance_url: Option<String>,
    /// RSA public key (PEM)
    pub public_key: Option<String>,
    /// RSA private key (PEM)
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    pub signature_alg: String,
    pub require_https: bool,
    pub allow_inbound: bool,
    pub allow_outbound: bool,
    /// Policy JSON, see [`FederationPolicy`]
    pub default_policies: String,
    /// Rate limit JSON advertised in the manifest
    pub rate_limits: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FederationConfig {
    pub const SINGLETON_ID: i64 = 1;

    /// Disabled settings used before the row exists.
    pub fn disabled() -> Self {
        let now = Utc::now();
        Self {
            id: Self::SINGLETON_ID,
            enabled: false,
            instance_name: None,
            instance_url: None,
            public_key: None,
            private_key: None,
            signature_alg: crate::federation::SignatureAlgorithm::RsaSha256
                .as_str()
                .to_string(),
            require_https: true,
            allow_inbound: true,
            allow_outbound: true,
            default_policies: "{}".to_string(),
            rate_limits: "{}".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn policy(&self) -> FederationPolicy {
        FederationPolicy::parse(&self.default_policies)
    }

    /// Instance URL without surrounding whitespace or trailing slash
    pub fn instance_url(&self) -> Option<&str> {
        non_empty(self.instance_url.as_deref()).map(|url| url.trim_end_matches('/'))
    }

    pub fn private_key(&self) -> Option<&str> {
        non_empty(self.private_key.as_deref())
    }

    pub fn public_key(&self) -> Option<&str> {
        non_empty(self.public_key.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

// =============================================================================
// Federation instance
// =============================================================================

/// Lifecycle of a known remote instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Active,
    Suspended,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

/// A remote blog instance we have talked to
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederationInstance {
    pub id: i64,
    /// Normalized base URL (unique)
    pub base_url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub protocol_version: Option<String>,
    pub public_key: Option<String>,
    pub key_id: Option<String>,
    /// JSON array of feature names
    pub features: String,
    /// JSON object of advertised policies
    pub policies: String,
    /// JSON endpoints document
    pub endpoints: String,
    pub status: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields refreshed from discovery documents on every upsert
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub base_url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub protocol_version: Option<String>,
    pub public_key: Option<String>,
    pub key_id: Option<String>,
    pub features: String,
    pub policies: String,
    pub endpoints: String,
    pub seen_at: DateTime<Utc>,
}

// =============================================================================
// Citations and mentions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStatus {
    Pending,
    Approved,
    Rejected,
}

impl CitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A remote post citing one of our articles
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederatedCitation {
    pub id: i64,
    pub source_instance_id: i64,
    pub source_post_url: String,
    pub source_post_title: Option<String>,
    pub target_article_id: i64,
    pub citation_context: Option<String>,
    pub citation_type: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
}

/// Citation to be persisted; the source instance is filled in by the store
#[derive(Debug, Clone)]
pub struct NewFederatedCitation {
    pub source_post_url: String,
    pub source_post_title: Option<String>,
    pub target_article_id: i64,
    pub citation_context: Option<String>,
    pub citation_type: String,
    pub status: CitationStatus,
    pub requested_at: DateTime<Utc>,
}

/// A remote post mentioning one of our users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederatedMention {
    pub id: i64,
    pub source_instance_id: i64,
    pub source_post_url: String,
    pub source_post_title: Option<String>,
    pub mentioned_user_id: i64,
    pub mention_context: String,
    pub mention_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFederatedMention {
    pub source_post_url: String,
    pub source_post_title: Option<String>,
    pub mentioned_user_id: i64,
    pub mention_context: String,
    pub mention_type: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Remote post cache
// =============================================================================

/// Cached copy of a remote timeline entry, unique by `url`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FederatedPostCache {
    pub id: i64,
    pub instance_id: i64,
    pub remote_post_id: Option<String>,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub content_preview: Option<String>,
    /// JSON object `{name, url, avatar}`
    pub author: String,
    /// JSON array
    pub tags: String,
    /// JSON array
    pub categories: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    pub language: Option<String>,
    pub allow_citation: bool,
    pub allow_comment: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub cached_at: DateTime<Utc>,
}

// =============================================================================
// Collaborators: users, articles, friend links
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub summary: String,
    pub lead_in: Option<String>,
    pub cover: Option<String>,
    /// Public slug, used in `/posts/{short_url}`
    pub short_url: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendLink {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub rss_url: Option<String>,
    /// "manual" or "federation"
    pub kind: String,
    pub sync_mode: String,
    pub instance_id: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Friend link proposal, one row per requester URL
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendLinkApplication {
    pub id: i64,
    pub name: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub apply_channel: String,
    pub requested_sync_mode: String,
    pub rss_url: Option<String>,
    pub instance_url: Option<String>,
    /// Requester manifest JSON at the time of the request
    pub manifest: String,
    pub signature_key_id: Option<String>,
    pub signature_verified: bool,
    pub message: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written when a friend link request is recorded
#[derive(Debug, Clone)]
pub struct NewFriendLinkApplication {
    pub name: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub apply_channel: String,
    pub requested_sync_mode: String,
    pub rss_url: Option<String>,
    pub instance_url: Option<String>,
    pub manifest: String,
    pub signature_key_id: Option<String>,
    pub signature_verified: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFriendLink {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub rss_url: Option<String>,
    pub kind: String,
    pub sync_mode: String,
    pub instance_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub author_id: i64,
    pub title: String,
    pub summary: String,
    pub lead_in: Option<String>,
    pub cover: Option<String>,
    pub short_url: String,
    pub is_published: bool,
}
