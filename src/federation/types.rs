//! Discovery document types
//!
//! The three documents every instance serves under
//! `/.well-known/blog-federation/`. Decoding is lenient: missing fields
//! take their defaults so that older peers remain readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version advertised in our manifest
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Directory all discovery documents live under
pub const WELL_KNOWN_PREFIX: &str = "/.well-known/blog-federation";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PUBLIC_KEY_FILE: &str = "public-key.json";
pub const ENDPOINTS_FILE: &str = "endpoints.json";

/// `manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub protocol_version: String,
    pub instance: ManifestInstance,
    pub software: ManifestSoftware,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<ManifestAdmin>,
    pub features: Vec<String>,
    pub policies: ManifestPolicies,
    pub rate_limits: ManifestRateLimits,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rss_feeds: Vec<RssFeed>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestInstance {
    pub name: String,
    pub url: String,
    pub description: String,
    pub language: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSoftware {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestAdmin {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestPolicies {
    pub allow_citation: bool,
    pub allow_mention: bool,
    pub auto_approve_friendlink_citation: bool,
    pub require_https: bool,
    pub max_cache_age: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestRateLimits {
    pub timeline_sync: i64,
    pub citation_request: i64,
    pub mention_notify: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssFeed {
    pub url: String,
    pub title: String,
}

/// `public-key.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicKeyDocument {
    pub key_id: String,
    pub algorithm: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `endpoints.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsDocument {
    /// Base URL relative endpoint paths are joined to
    pub base_url: String,
    /// Action key to path or absolute URL
    pub endpoints: BTreeMap<String, String>,
}

/// Identity established by a successful signature check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub key_id: String,
    /// `scheme://host[:port]` derived from the keyId
    pub base_url: String,
    /// Value of the signed `Date` header
    pub date_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_decodes_with_missing_fields() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"protocol_version":"1.0.0","instance":{"name":"Peer","url":"https://peer.example"}}"#,
        )
        .unwrap();

        assert_eq!(manifest.instance.name, "Peer");
        assert!(manifest.features.is_empty());
        assert!(!manifest.policies.allow_citation);
    }

    #[test]
    fn endpoints_document_round_trips_paths() {
        let doc: EndpointsDocument = serde_json::from_str(
            r#"{"base_url":"https://peer.example/api/federation","endpoints":{"citation_request":"/citations/request"}}"#,
        )
        .unwrap();

        assert_eq!(
            doc.endpoints.get("citation_request").map(String::as_str),
            Some("/citations/request")
        );
    }
}
