//! Federation protocol errors
//!
//! Everything that can go wrong while discovering a peer, signing a
//! request or verifying one. `AppError` wraps these for HTTP responses.

use thiserror::Error;

/// Protocol-level failure
#[derive(Debug, Error)]
pub enum FederationError {
    /// Well-known document could not be fetched or decoded
    #[error("well-known request to {url} failed: {reason}")]
    Discovery { url: String, reason: String },

    /// Request carries no `Signature` header
    #[error("missing signature header")]
    MissingSignatureHeader,

    /// `Digest` header missing or does not match the body
    #[error("invalid digest header")]
    InvalidDigest,

    /// `Date` header outside the allowed clock skew
    #[error("signature timestamp expired")]
    SignatureExpired,

    /// Algorithm other than RSA-SHA256
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// keyId is not an absolute URL
    #[error("invalid keyId: {0}")]
    InvalidKeyId(String),

    /// Signature header present but unusable
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// `Date` header missing or not an HTTP-date
    #[error("invalid Date header: {0}")]
    InvalidDate(String),

    /// PEM key could not be parsed
    #[error("invalid key: {0}")]
    KeyParse(String),

    /// Cryptographic check failed
    #[error("signature verification failed")]
    VerificationFailed,

    /// Local configuration forbids sending
    #[error("federation outbound disabled: {0}")]
    OutboundDisabled(String),

    /// Outbound target cannot be turned into a base URL
    #[error("invalid federation target: {0}")]
    InvalidTarget(String),

    /// Metadata cache backend failure
    #[error("metadata cache error: {0}")]
    Cache(String),
}

impl FederationError {
    /// Whether this error means the request's signature was not trusted.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            FederationError::MissingSignatureHeader
                | FederationError::InvalidDigest
                | FederationError::SignatureExpired
                | FederationError::UnsupportedAlgorithm(_)
                | FederationError::InvalidKeyId(_)
                | FederationError::MalformedSignature(_)
                | FederationError::InvalidDate(_)
                | FederationError::KeyParse(_)
                | FederationError::VerificationFailed
        )
    }

    /// Short label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            FederationError::Discovery { .. } => "discovery",
            FederationError::MissingSignatureHeader => "missing_signature",
            FederationError::InvalidDigest => "invalid_digest",
            FederationError::SignatureExpired => "expired",
            FederationError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            FederationError::InvalidKeyId(_) => "invalid_key_id",
            FederationError::MalformedSignature(_) => "malformed_signature",
            FederationError::InvalidDate(_) => "invalid_date",
            FederationError::KeyParse(_) => "key_parse",
            FederationError::VerificationFailed => "verification_failed",
            FederationError::OutboundDisabled(_) => "outbound_disabled",
            FederationError::InvalidTarget(_) => "invalid_target",
            FederationError::Cache(_) => "cache",
        }
    }
}
