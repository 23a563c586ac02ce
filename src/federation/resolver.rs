//! Peer discovery
//!
//! Fetches the well-known documents of a remote instance, cache first.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::cache::{KIND_ENDPOINTS, KIND_MANIFEST, KIND_PUBLIC_KEY, MetadataCache};
use super::error::FederationError;
use super::types::{
    ENDPOINTS_FILE, EndpointsDocument, MANIFEST_FILE, Manifest, PUBLIC_KEY_FILE,
    PublicKeyDocument, WELL_KNOWN_PREFIX,
};
use crate::metrics::DISCOVERY_FETCHES_TOTAL;

/// How long each document kind stays cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub manifest: Duration,
    pub public_key: Duration,
    pub endpoints: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            manifest: Duration::from_secs(3600),
            public_key: Duration::from_secs(24 * 3600),
            endpoints: Duration::from_secs(3600),
        }
    }
}

/// Well-known document resolver
///
/// Cache reads that fail abort the lookup. Cache writes that fail are
/// logged and the fetched document is returned anyway.
pub struct Resolver {
    http_client: Arc<reqwest::Client>,
    cache: Option<Arc<dyn MetadataCache>>,
    ttls: CacheTtls,
}

impl Resolver {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `http_client` - Shared client; its timeout bounds every fetch
    /// * `cache` - Optional metadata cache
    /// * `ttls` - Per-kind cache lifetimes
    pub fn new(
        http_client: Arc<reqwest::Client>,
        cache: Option<Arc<dyn MetadataCache>>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            http_client,
            cache,
            ttls,
        }
    }

    pub async fn fetch_manifest(&self, base_url: &str) -> Result<Manifest, FederationError> {
        let base = normalize_base_url(base_url);

        if let Some(cache) = &self.cache {
            if let Some(manifest) = cache.get_manifest(&base).await? {
                return Ok(manifest);
            }
        }

        let manifest: Manifest = self.fetch_document(&base, MANIFEST_FILE, KIND_MANIFEST).await?;

        if let Some(cache) = &self.cache {
            if let Err(error) = cache.set_manifest(&base, &manifest, self.ttls.manifest).await {
                tracing::warn!(%error, base_url = %base, "Failed to cache manifest");
            }
        }

        Ok(manifest)
    }

    pub async fn fetch_public_key(
        &self,
        base_url: &str,
    ) -> Result<PublicKeyDocument, FederationError> {
        let base = normalize_base_url(base_url);

        if let Some(cache) = &self.cache {
            if let Some(document) = cache.get_public_key(&base).await? {
                return Ok(document);
            }
        }

        let document: PublicKeyDocument = self
            .fetch_document(&base, PUBLIC_KEY_FILE, KIND_PUBLIC_KEY)
            .await?;

        if let Some(cache) = &self.cache {
            if let Err(error) = cache
                .set_public_key(&base, &document, self.ttls.public_key)
                .await
            {
                tracing::warn!(%error, base_url = %base, "Failed to cache public key");
            }
        }

        Ok(document)
    }

    pub async fn fetch_endpoints(
        &self,
        base_url: &str,
    ) -> Result<EndpointsDocument, FederationError> {
        let base = normalize_base_url(base_url);

        if let Some(cache) = &self.cache {
            if let Some(document) = cache.get_endpoints(&base).await? {
                return Ok(document);
            }
        }

        let document: EndpointsDocument = self
            .fetch_document(&base, ENDPOINTS_FILE, KIND_ENDPOINTS)
            .await?;

        if let Some(cache) = &self.cache {
            if let Err(error) = cache
                .set_endpoints(&base, &document, self.ttls.endpoints)
                .await
            {
                tracing::warn!(%error, base_url = %base, "Failed to cache endpoints");
            }
        }

        Ok(document)
    }

    async fn fetch_document<T: DeserializeOwned>(
        &self,
        base_url: &str,
        file: &str,
        kind: &'static str,
    ) -> Result<T, FederationError> {
        let url = well_known_url(base_url, file);
        let discovery_error = |reason: String| {
            DISCOVERY_FETCHES_TOTAL
                .with_label_values(&[kind, "error"])
                .inc();
            FederationError::Discovery {
                url: url.clone(),
                reason,
            }
        };

        tracing::debug!(%url, "Fetching discovery document");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(discovery_error(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;
        let document = serde_json::from_slice::<T>(&body)
            .map_err(|e| discovery_error(format!("invalid JSON: {}", e)))?;

        DISCOVERY_FETCHES_TOTAL.with_label_values(&[kind, "ok"]).inc();

        Ok(document)
    }
}

/// Normalize a peer base URL
///
/// Trims whitespace and trailing slashes. HTTP(S) URLs are rebuilt from
/// scheme, host, port and path so that casing differences in the
/// authority collapse to one form.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');

    match url::Url::parse(trimmed) {
        Ok(parsed) if is_http(&parsed) && parsed.host_str().is_some() => {
            let mut normalized = origin_of(&parsed);
            normalized.push_str(parsed.path().trim_end_matches('/'));
            normalized
        }
        _ => trimmed.to_string(),
    }
}

/// `{base}/.well-known/blog-federation/{file}`
pub fn well_known_url(base_url: &str, file: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        WELL_KNOWN_PREFIX,
        file
    )
}

/// `scheme://host[:port]` of a parsed URL; default ports are omitted.
pub fn origin_of(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Whether two URLs share scheme, host and port (case-insensitive).
pub fn same_base_url(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (url::Url::parse(a.trim()), url::Url::parse(b.trim())) else {
        return false;
    };

    let (Some(host_a), Some(host_b)) = (a.host_str(), b.host_str()) else {
        return false;
    };

    a.scheme().eq_ignore_ascii_case(b.scheme())
        && host_a.eq_ignore_ascii_case(host_b)
        && a.port_or_known_default() == b.port_or_known_default()
}

pub(crate) fn is_http(url: &url::Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::cache::InMemoryMetadataCache;
    use axum::{Json, Router, routing::get};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve a manifest and count how often it is fetched
    async fn spawn_counting_peer(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/.well-known/blog-federation/manifest.json",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "protocol_version": "1.0.0",
                        "instance": {"name": "Peer", "url": "http://peer"}
                    }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn resolver(cache: Option<Arc<dyn MetadataCache>>, ttls: CacheTtls) -> Resolver {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        Resolver::new(Arc::new(client), cache, ttls)
    }

    #[test]
    fn normalize_base_url_trims_and_lowercases() {
        assert_eq!(
            normalize_base_url("  HTTPS://Peer.Example/ "),
            "https://peer.example"
        );
        assert_eq!(
            normalize_base_url("https://peer.example:8443/blog/"),
            "https://peer.example:8443/blog"
        );
        assert_eq!(
            normalize_base_url("https://peer.example:443"),
            "https://peer.example"
        );
    }

    #[test]
    fn well_known_url_joins_prefix() {
        assert_eq!(
            well_known_url("https://peer.example/", MANIFEST_FILE),
            "https://peer.example/.well-known/blog-federation/manifest.json"
        );
    }

    #[test]
    fn same_base_url_compares_origin() {
        assert!(same_base_url(
            "https://Good.Example/posts/1",
            "https://good.example"
        ));
        assert!(same_base_url(
            "https://good.example:443",
            "https://good.example"
        ));
        assert!(!same_base_url("https://good.example", "https://evil.example"));
        assert!(!same_base_url("http://good.example", "https://good.example"));
        assert!(!same_base_url("not a url", "https://good.example"));
    }

    #[tokio::test]
    async fn manifest_is_cached_until_ttl_expires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_counting_peer(hits.clone()).await;

        let cache: Arc<dyn MetadataCache> = Arc::new(InMemoryMetadataCache::new());
        let ttls = CacheTtls {
            manifest: Duration::from_millis(200),
            ..CacheTtls::default()
        };
        let resolver = resolver(Some(cache), ttls);

        let first = resolver.fetch_manifest(&base).await.unwrap();
        let second = resolver.fetch_manifest(&format!("{base}/")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;

        resolver.fetch_manifest(&base).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_document_is_discovery_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_counting_peer(hits).await;
        let resolver = resolver(None, CacheTtls::default());

        match resolver.fetch_endpoints(&base).await {
            Err(FederationError::Discovery { url, reason }) => {
                assert!(url.ends_with("/.well-known/blog-federation/endpoints.json"));
                assert!(reason.contains("404"));
            }
            other => panic!("expected discovery error, got: {other:?}"),
        }
    }
}
