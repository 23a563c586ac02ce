//! Metadata caching
//!
//! Caches fetched discovery documents to reduce remote requests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::error::FederationError;
use super::types::{EndpointsDocument, Manifest, PublicKeyDocument};
use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_SIZE};

/// Document kinds, used in cache keys and metric labels
pub const KIND_MANIFEST: &str = "manifest";
pub const KIND_PUBLIC_KEY: &str = "pubkey";
pub const KIND_ENDPOINTS: &str = "endpoints";

/// Build the cache key for a document of `kind` served by `base_url`.
pub fn cache_key(kind: &str, base_url: &str) -> String {
    format!("bfp:{}:{}", kind, urlencoding::encode(base_url))
}

/// TTL key/value store for discovery documents
///
/// A read error is surfaced to the caller; write errors are reported but
/// the resolver treats them as non-fatal.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get_manifest(&self, base_url: &str) -> Result<Option<Manifest>, FederationError>;
    async fn set_manifest(
        &self,
        base_url: &str,
        manifest: &Manifest,
        ttl: Duration,
    ) -> Result<(), FederationError>;

    async fn get_public_key(
        &self,
        base_url: &str,
    ) -> Result<Option<PublicKeyDocument>, FederationError>;
    async fn set_public_key(
        &self,
        base_url: &str,
        document: &PublicKeyDocument,
        ttl: Duration,
    ) -> Result<(), FederationError>;

    async fn get_endpoints(
        &self,
        base_url: &str,
    ) -> Result<Option<EndpointsDocument>, FederationError>;
    async fn set_endpoints(
        &self,
        base_url: &str,
        document: &EndpointsDocument,
        ttl: Duration,
    ) -> Result<(), FederationError>;
}

#[derive(Debug, Clone)]
enum CachedDocument {
    Manifest(Manifest),
    PublicKey(PublicKeyDocument),
    Endpoints(EndpointsDocument),
}

/// Cached document entry
#[derive(Debug, Clone)]
struct CachedEntry {
    document: CachedDocument,
    /// When this entry was cached
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    /// Check if this cache entry is still valid
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// In-process metadata cache
///
/// Thread-safe map from cache key to document with per-entry expiry.
#[derive(Default)]
pub struct InMemoryMetadataCache {
    entries: Arc<RwLock<HashMap<String, CachedEntry>>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup(&self, kind: &'static str, base_url: &str) -> Option<CachedDocument> {
        let key = cache_key(kind, base_url);
        let entries = self.entries.read().await;

        match entries.get(&key) {
            Some(entry) if entry.is_valid() => {
                tracing::debug!(%key, "Metadata cache hit");
                CACHE_HITS_TOTAL.with_label_values(&[kind]).inc();
                Some(entry.document.clone())
            }
            _ => {
                tracing::debug!(%key, "Metadata cache miss");
                CACHE_MISSES_TOTAL.with_label_values(&[kind]).inc();
                None
            }
        }
    }

    async fn store(&self, kind: &'static str, base_url: &str, document: CachedDocument, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            cache_key(kind, base_url),
            CachedEntry {
                document,
                cached_at: Instant::now(),
                ttl,
            },
        );
        CACHE_SIZE
            .with_label_values(&["metadata"])
            .set(entries.len() as i64);
    }

    /// Drop every cached document for a base URL
    ///
    /// Useful when a peer is known to have rotated its key.
    pub async fn invalidate(&self, base_url: &str) {
        let mut entries = self.entries.write().await;
        for kind in [KIND_MANIFEST, KIND_PUBLIC_KEY, KIND_ENDPOINTS] {
            entries.remove(&cache_key(kind, base_url));
        }
        tracing::debug!(%base_url, "Invalidated metadata cache entries");
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let total = entries.len();
        let valid = entries.values().filter(|v| v.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    /// Prune expired entries
    ///
    /// Should be called periodically to clean up expired entries.
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| v.is_valid());
        let removed = before - entries.len();

        CACHE_SIZE
            .with_label_values(&["metadata"])
            .set(entries.len() as i64);

        if removed > 0 {
            tracing::info!("Pruned {} expired metadata cache entries", removed);
        }

        removed
    }
}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    async fn get_manifest(&self, base_url: &str) -> Result<Option<Manifest>, FederationError> {
        match self.lookup(KIND_MANIFEST, base_url).await {
            Some(CachedDocument::Manifest(manifest)) => Ok(Some(manifest)),
            Some(_) => Err(FederationError::Cache(format!(
                "unexpected document under manifest key for {base_url}"
            ))),
            None => Ok(None),
        }
    }

    async fn set_manifest(
        &self,
        base_url: &str,
        manifest: &Manifest,
        ttl: Duration,
    ) -> Result<(), FederationError> {
        self.store(
            KIND_MANIFEST,
            base_url,
            CachedDocument::Manifest(manifest.clone()),
            ttl,
        )
        .await;
        Ok(())
    }

    async fn get_public_key(
        &self,
        base_url: &str,
    ) -> Result<Option<PublicKeyDocument>, FederationError> {
        match self.lookup(KIND_PUBLIC_KEY, base_url).await {
            Some(CachedDocument::PublicKey(document)) => Ok(Some(document)),
            Some(_) => Err(FederationError::Cache(format!(
                "unexpected document under public key key for {base_url}"
            ))),
            None => Ok(None),
        }
    }

    async fn set_public_key(
        &self,
        base_url: &str,
        document: &PublicKeyDocument,
        ttl: Duration,
    ) -> Result<(), FederationError> {
        self.store(
            KIND_PUBLIC_KEY,
            base_url,
            CachedDocument::PublicKey(document.clone()),
            ttl,
        )
        .await;
        Ok(())
    }

    async fn get_endpoints(
        &self,
        base_url: &str,
    ) -> Result<Option<EndpointsDocument>, FederationError> {
        match self.lookup(KIND_ENDPOINTS, base_url).await {
            Some(CachedDocument::Endpoints(document)) => Ok(Some(document)),
            Some(_) => Err(FederationError::Cache(format!(
                "unexpected document under endpoints key for {base_url}"
            ))),
            None => Ok(None),
        }
    }

    async fn set_endpoints(
        &self,
        base_url: &str,
        document: &EndpointsDocument,
        ttl: Duration,
    ) -> Result<(), FederationError> {
        self.store(
            KIND_ENDPOINTS,
            base_url,
            CachedDocument::Endpoints(document.clone()),
            ttl,
        )
        .await;
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_escapes_base_url() {
        assert_eq!(
            cache_key(KIND_MANIFEST, "https://peer.example:8443"),
            "bfp:manifest:https%3A%2F%2Fpeer.example%3A8443"
        );
    }

    #[tokio::test]
    async fn stores_documents_per_kind() {
        let cache = InMemoryMetadataCache::new();
        let base = "https://peer.example";

        let endpoints = EndpointsDocument {
            base_url: format!("{base}/api/federation"),
            ..Default::default()
        };
        cache
            .set_endpoints(base, &endpoints, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get_endpoints(base).await.unwrap(), Some(endpoints));
        assert!(cache.get_manifest(base).await.unwrap().is_none());
        assert!(cache.get_public_key(base).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses_and_pruned() {
        let cache = InMemoryMetadataCache::new();
        let base = "https://peer.example";

        cache
            .set_manifest(base, &Manifest::default(), Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set_public_key(base, &PublicKeyDocument::default(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get_manifest(base).await.unwrap().is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);

        assert_eq!(cache.prune_expired().await, 1);
        assert_eq!(cache.stats().await.total_entries, 1);

        cache.invalidate(base).await;
        assert_eq!(cache.stats().await.total_entries, 0);
    }
}
