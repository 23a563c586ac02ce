//! Remote instance bookkeeping
//!
//! The three discovery documents of a peer are fetched together and folded
//! into an [`InstanceSnapshot`], which the store upserts by base URL.

use chrono::Utc;

use super::error::FederationError;
use super::resolver::{Resolver, normalize_base_url};
use super::types::{EndpointsDocument, Manifest, PublicKeyDocument};
use crate::data::{Database, FederationInstance, InstanceSnapshot};
use crate::error::AppError;

/// Discovery documents of one peer
#[derive(Debug, Clone)]
pub struct PeerDocuments {
    pub manifest: Manifest,
    pub endpoints: EndpointsDocument,
    pub public_key: PublicKeyDocument,
}

impl PeerDocuments {
    /// Row contents for `federation_instances`, stamped with the current time
    pub fn snapshot(&self, base_url: &str) -> InstanceSnapshot {
        InstanceSnapshot {
            base_url: normalize_base_url(base_url),
            name: optional(&self.manifest.instance.name),
            description: optional(&self.manifest.instance.description),
            protocol_version: optional(&self.manifest.protocol_version),
            public_key: optional(&self.public_key.public_key),
            key_id: optional(&self.public_key.key_id),
            features: to_json(&self.manifest.features, "[]"),
            policies: to_json(&self.manifest.policies, "{}"),
            endpoints: to_json(&self.endpoints, "{}"),
            seen_at: Utc::now(),
        }
    }

    pub fn manifest_json(&self) -> String {
        to_json(&self.manifest, "{}")
    }
}

/// Fetch manifest, endpoints and public key of a peer concurrently
///
/// # Errors
/// The first discovery failure; nothing partial is returned.
pub async fn fetch_peer_documents(
    resolver: &Resolver,
    base_url: &str,
) -> Result<PeerDocuments, FederationError> {
    let base = normalize_base_url(base_url);

    let (manifest, endpoints, public_key) = tokio::try_join!(
        resolver.fetch_manifest(&base),
        resolver.fetch_endpoints(&base),
        resolver.fetch_public_key(&base),
    )?;

    Ok(PeerDocuments {
        manifest,
        endpoints,
        public_key,
    })
}

/// Fetch a peer's documents and upsert its instance row
///
/// New rows start `pending`; known rows keep their status.
pub async fn ensure_federation_instance(
    db: &Database,
    resolver: &Resolver,
    base_url: &str,
) -> Result<FederationInstance, AppError> {
    let documents = fetch_peer_documents(resolver, base_url).await?;
    db.upsert_federation_instance(&documents.snapshot(base_url))
        .await
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn to_json<T: serde::Serialize>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::types::{ManifestInstance, PROTOCOL_VERSION};

    fn documents() -> PeerDocuments {
        PeerDocuments {
            manifest: Manifest {
                protocol_version: PROTOCOL_VERSION.to_string(),
                instance: ManifestInstance {
                    name: " Peer Blog ".to_string(),
                    url: "https://peer.example".to_string(),
                    ..Default::default()
                },
                features: vec!["cross-citation".to_string()],
                ..Default::default()
            },
            endpoints: EndpointsDocument {
                base_url: "https://peer.example/api/federation".to_string(),
                ..Default::default()
            },
            public_key: PublicKeyDocument {
                key_id: "https://peer.example/.well-known/blog-federation/public-key.json"
                    .to_string(),
                public_key: "PEM".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn snapshot_trims_and_serializes_documents() {
        let snapshot = documents().snapshot("https://Peer.example/");

        assert_eq!(snapshot.base_url, "https://peer.example");
        assert_eq!(snapshot.name.as_deref(), Some("Peer Blog"));
        assert_eq!(snapshot.description, None);
        assert_eq!(snapshot.features, r#"["cross-citation"]"#);
        assert!(snapshot.endpoints.contains("/api/federation"));
        assert_eq!(snapshot.public_key.as_deref(), Some("PEM"));
    }
}
