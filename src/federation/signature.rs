//! HTTP Signatures for blog federation
//!
//! Draft-cavage style signatures with RSASSA-PKCS1-v1_5 over SHA-256,
//! compatible with the `keyId`/`algorithm`/`headers`/`signature` header
//! format used by other implementations.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, Method, header};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::error::FederationError;

/// Headers covered by outbound signatures, in order
pub const SIGNED_HEADERS: [&str; 5] = ["(request-target)", "host", "date", "digest", "content-type"];

/// Format of the `Date` header
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Supported signature algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
}

impl SignatureAlgorithm {
    /// Resolve a configured or advertised algorithm name
    ///
    /// Unknown names fail closed.
    pub fn parse(raw: &str) -> Result<Self, FederationError> {
        match raw.trim() {
            "rsa-sha256" | "rsa_sha256" | "RSA-SHA256" => Ok(Self::RsaSha256),
            other => Err(FederationError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-sha256",
        }
    }
}

/// Signs outbound requests with this instance's private key
///
/// Built per send; holds the parsed key for one signing operation.
pub struct Signer {
    algorithm: SignatureAlgorithm,
    signing_key: SigningKey<Sha256>,
}

impl Signer {
    /// Create a signer
    ///
    /// # Arguments
    /// * `algorithm` - Algorithm name from the federation config
    /// * `private_key_pem` - PKCS#1 or PKCS#8 PEM
    pub fn new(algorithm: &str, private_key_pem: &str) -> Result<Self, FederationError> {
        let algorithm = SignatureAlgorithm::parse(algorithm)?;
        let private_key = parse_private_key(private_key_pem)?;

        Ok(Self {
            algorithm,
            signing_key: SigningKey::<Sha256>::new(private_key),
        })
    }

    /// Sign a request in place
    ///
    /// Sets `Date` if missing, `Content-Type: application/json` if the body
    /// is non-empty and no type is set, then `Host`, `Digest` and
    /// `Signature`.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `url` - Full request URL
    /// * `headers` - Headers that will be sent
    /// * `body` - Exact body bytes that will be sent
    /// * `key_id` - URL of our public key document
    pub fn sign_request(
        &self,
        method: &Method,
        url: &url::Url,
        headers: &mut HeaderMap,
        body: &[u8],
        key_id: &str,
    ) -> Result<(), FederationError> {
        if !headers.contains_key(header::DATE) {
            headers.insert(header::DATE, header_value(&format_http_date(Utc::now()))?);
        }
        if !body.is_empty() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        headers.insert(header::HOST, header_value(&host_header_value(url)?)?);
        headers.insert("digest", header_value(&generate_digest(body))?);

        let signed_headers: Vec<String> = SIGNED_HEADERS
            .iter()
            .filter(|name| **name != "content-type" || headers.contains_key(header::CONTENT_TYPE))
            .map(|name| name.to_string())
            .collect();

        let signing_string =
            build_signing_string(&signed_headers, method, &path_and_query(url), headers)?;

        let mut rng = rand::thread_rng();
        let signature = self
            .signing_key
            .try_sign_with_rng(&mut rng, signing_string.as_bytes())
            .map_err(|e| FederationError::MalformedSignature(e.to_string()))?;

        let signature_header = format!(
            "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
            key_id,
            self.algorithm.as_str(),
            signed_headers.join(" "),
            BASE64.encode(signature.to_bytes())
        );
        headers.insert("signature", header_value(&signature_header)?);

        Ok(())
    }
}

/// Check an RSA signature over the reconstructed signing string.
pub fn verify_signature(
    parsed: &ParsedSignature,
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
    public_key: &RsaPublicKey,
    algorithm: SignatureAlgorithm,
) -> Result<(), FederationError> {
    let signing_string = build_signing_string(&parsed.headers, method, path_and_query, headers)?;

    let signature_bytes = BASE64
        .decode(parsed.signature.as_bytes())
        .map_err(|_| FederationError::MalformedSignature("invalid signature encoding".into()))?;

    match algorithm {
        SignatureAlgorithm::RsaSha256 => {
            let verifier = VerifyingKey::<Sha256>::new(public_key.clone());
            let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
                .map_err(|e| FederationError::MalformedSignature(e.to_string()))?;

            verifier
                .verify(signing_string.as_bytes(), &signature)
                .map_err(|_| FederationError::VerificationFailed)
        }
    }
}

/// Build the newline-joined `name: value` signing string.
pub fn build_signing_string(
    signed_headers: &[String],
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
) -> Result<String, FederationError> {
    let mut parts = Vec::with_capacity(signed_headers.len());

    for name in signed_headers {
        let value = if name == "(request-target)" {
            format!("{} {}", method.as_str().to_lowercase(), path_and_query)
        } else {
            headers
                .get(name.as_str())
                .ok_or_else(|| {
                    FederationError::MalformedSignature(format!("missing signed header: {}", name))
                })?
                .to_str()
                .map_err(|_| {
                    FederationError::MalformedSignature(format!("invalid signed header: {}", name))
                })?
                .trim()
                .to_string()
        };

        parts.push(format!("{}: {}", name, value));
    }

    Ok(parts.join("\n"))
}

/// Parsed Signature header
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key document)
    pub key_id: String,
    /// Declared algorithm, informational only
    pub algorithm: Option<String>,
    /// Signed header names, lowercased
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse Signature header value
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// A missing `headers` parameter means `date` only.
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, FederationError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    // Split by comma and parse key=value pairs
    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim();
            // Remove quotes from value
            let value = value.trim().trim_matches('"');

            match key {
                "keyId" => key_id = Some(value.to_string()),
                "algorithm" => algorithm = Some(value.to_string()),
                "headers" => {
                    headers = Some(
                        value
                            .split_whitespace()
                            .map(|s| s.to_ascii_lowercase())
                            .collect(),
                    )
                }
                "signature" => signature = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }
    }

    Ok(ParsedSignature {
        key_id: key_id
            .filter(|k| !k.is_empty())
            .ok_or_else(|| FederationError::InvalidKeyId("missing keyId".to_string()))?,
        algorithm,
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FederationError::MalformedSignature("missing signature".to_string()))?,
    })
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("SHA-256={}", BASE64.encode(hash))
}

/// Check a `Digest` header against the body.
///
/// The header may list several `alg=value` entries; the SHA-256 one must
/// match. Algorithm names compare case-insensitively.
pub fn verify_digest(digest_header: &str, body: &[u8]) -> Result<(), FederationError> {
    let expected = generate_digest(body);
    let expected_value = expected.trim_start_matches("SHA-256=");

    let matched = digest_header.split(',').any(|entry| {
        entry
            .trim()
            .split_once('=')
            .map(|(algorithm, value)| {
                algorithm.trim().eq_ignore_ascii_case("SHA-256") && value.trim() == expected_value
            })
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(FederationError::InvalidDigest)
    }
}

pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(raw: &str) -> Result<DateTime<Utc>, FederationError> {
    DateTime::parse_from_rfc2822(raw.trim())
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| FederationError::InvalidDate(e.to_string()))
}

/// Parse an RSA public key from SPKI or PKCS#1 PEM.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, FederationError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| FederationError::KeyParse(e.to_string()))
}

/// Parse an RSA private key from PKCS#1 or PKCS#8 PEM.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, FederationError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| FederationError::KeyParse(e.to_string()))
}

/// Generate an RSA key pair
///
/// # Returns
/// `(public_key_pem, private_key_pem)`: SPKI public key, PKCS#1 private key
pub fn generate_key_pair(bits: usize) -> Result<(String, String), FederationError> {
    let mut rng = rand::thread_rng();
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).map_err(|e| FederationError::KeyParse(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| FederationError::KeyParse(e.to_string()))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| FederationError::KeyParse(e.to_string()))?;

    Ok((public_key_pem, private_key_pem))
}

/// `path?query` of a URL, as used in `(request-target)`
pub fn path_and_query(url: &url::Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// `host[:port]` as sent in the `Host` header
fn host_header_value(url: &url::Url) -> Result<String, FederationError> {
    let host = url
        .host_str()
        .ok_or_else(|| FederationError::InvalidTarget(format!("missing host in {}", url)))?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue, FederationError> {
    HeaderValue::from_str(value)
        .map_err(|e| FederationError::MalformedSignature(format!("invalid header value: {}", e)))
}
