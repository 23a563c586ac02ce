//! Inbound request verification
//!
//! Every step is a hard gate; the first failure is returned.

use chrono::{Duration, Utc};
use http::{HeaderMap, Method};
use std::sync::Arc;

use super::error::FederationError;
use super::resolver::{Resolver, is_http, origin_of};
use super::signature::{
    SignatureAlgorithm, parse_http_date, parse_public_key, parse_signature_header,
    verify_digest, verify_signature,
};
use super::types::VerifiedSignature;

/// Default accepted clock difference for the `Date` header
pub const DEFAULT_ALLOWED_SKEW_SECS: i64 = 300;

pub struct Verifier {
    resolver: Arc<Resolver>,
    allowed_skew: Duration,
}

impl Verifier {
    /// Create a verifier
    ///
    /// A non-positive skew falls back to five minutes.
    pub fn new(resolver: Arc<Resolver>, allowed_skew: Duration) -> Self {
        let allowed_skew = if allowed_skew > Duration::zero() {
            allowed_skew
        } else {
            Duration::seconds(DEFAULT_ALLOWED_SKEW_SECS)
        };

        Self {
            resolver,
            allowed_skew,
        }
    }

    /// Verify a signed inbound request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path_and_query` - Original request target, including any nesting prefix
    /// * `headers` - All request headers
    /// * `body` - Raw body bytes
    ///
    /// # Returns
    /// The signer's keyId, its base URL and the signed date
    pub async fn verify_request(
        &self,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<VerifiedSignature, FederationError> {
        // 1. Signature present
        let signature_header = headers
            .get("signature")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(FederationError::MissingSignatureHeader)?;

        // 2. Digest matches the body
        if !body.is_empty() {
            let digest = headers
                .get("digest")
                .and_then(|value| value.to_str().ok())
                .ok_or(FederationError::InvalidDigest)?;
            verify_digest(digest, body)?;
        }

        // 3. Date within the allowed skew
        let date_header = headers
            .get(http::header::DATE)
            .ok_or_else(|| FederationError::InvalidDate("missing Date header".to_string()))?
            .to_str()
            .map_err(|_| FederationError::InvalidDate("non-ASCII Date header".to_string()))?;
        let date_time = parse_http_date(date_header)?;

        let diff = (Utc::now().timestamp() - date_time.timestamp()).abs();
        if diff > self.allowed_skew.num_seconds() {
            return Err(FederationError::SignatureExpired);
        }

        // 4. keyId and signed header coverage
        let parsed = parse_signature_header(signature_header)?;
        let key_url = url::Url::parse(&parsed.key_id)
            .map_err(|_| FederationError::InvalidKeyId(parsed.key_id.clone()))?;
        if !is_http(&key_url) || key_url.host_str().is_none() {
            return Err(FederationError::InvalidKeyId(parsed.key_id.clone()));
        }

        let mut required = vec!["(request-target)", "host", "date"];
        if !body.is_empty() {
            required.push("digest");
        }
        if let Some(missing) = required
            .iter()
            .find(|name| !parsed.headers.iter().any(|h| h == *name))
        {
            return Err(FederationError::MalformedSignature(format!(
                "signed headers must include {}",
                missing
            )));
        }

        // 5. Fetch the signer's key
        let base_url = origin_of(&key_url);
        let document = self.resolver.fetch_public_key(&base_url).await?;
        if document.public_key.trim().is_empty() {
            return Err(FederationError::KeyParse(format!(
                "empty public key advertised by {}",
                base_url
            )));
        }

        // 6. Verify with the advertised algorithm
        let public_key = parse_public_key(&document.public_key)?;
        let algorithm = if document.algorithm.trim().is_empty() {
            SignatureAlgorithm::RsaSha256
        } else {
            SignatureAlgorithm::parse(&document.algorithm)?
        };

        verify_signature(&parsed, method, path_and_query, headers, &public_key, algorithm)?;

        Ok(VerifiedSignature {
            key_id: parsed.key_id,
            base_url,
            date_time,
        })
    }
}
