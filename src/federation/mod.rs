//! Blog federation module
//!
//! Handles:
//! - Discovery documents and their cache
//! - HTTP Signatures (signing and verification)
//! - Inbound policy
//! - Outbound friend link, citation and mention requests
//! - Content signal parsing and federation events

mod cache;
mod error;
mod events;
mod instance;
mod outbound;
mod parser;
mod payload;
mod policy;
mod resolver;
mod signature;
mod types;
mod verifier;

pub use cache::{CacheStats, InMemoryMetadataCache, MetadataCache, cache_key};
pub use error::FederationError;
pub use events::{
    CitationDetected, EventBus, EventReceiver, FederationEvent, MentionDetected,
    publish_federation_signals, register_subscribers,
};
pub use instance::{PeerDocuments, ensure_federation_instance, fetch_peer_documents};
pub use outbound::{
    DEFAULT_CITATION_TYPE, DEFAULT_MENTION_TYPE, OutboundAction, OutboundResponse,
    OutboundService, endpoint_url,
};
pub use parser::{CitationSignal, MentionSignal, parse_signals};
pub use payload::{
    CitationRequestPayload, CitationRequestResult, CitationSourcePost, FederationPost,
    FriendLinkRequestPayload, FriendLinkRequestResult, MentionNotifyPayload,
    MentionNotifyResult, MentionSourcePost, PostAuthor, PostDetail, TimelinePage,
};
pub use policy::{FederationPolicy, InboundAction, authorize_inbound};
pub use resolver::{CacheTtls, Resolver, normalize_base_url, origin_of, same_base_url, well_known_url};
pub use signature::{
    SignatureAlgorithm, Signer, generate_key_pair, parse_signature_header, verify_signature,
};
pub use types::{
    ENDPOINTS_FILE, EndpointsDocument, MANIFEST_FILE, Manifest, ManifestAdmin, ManifestInstance,
    ManifestPolicies, ManifestRateLimits, ManifestSoftware, PROTOCOL_VERSION, PUBLIC_KEY_FILE,
    PublicKeyDocument, RssFeed, VerifiedSignature, WELL_KNOWN_PREFIX,
};
pub use verifier::{DEFAULT_ALLOWED_SKEW_SECS, Verifier};
