//! Blogfed - inter-instance federation for blogs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Well-known discovery documents                           │
//! │  - Signed federation actions, public timeline               │
//! │  - Admin API                                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Inbound actions, federation config                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Federation Layer                           │
//! │  - Resolver + metadata cache, signer, verifier              │
//! │  - Outbound exchange, policy, signal parser, events         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Inbound actions and config administration
//! - `federation`: Protocol machinery
//! - `data`: Database layer and collaborator interfaces
//! - `auth`: Admin token middleware
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus collectors

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// HTTP client for federation
    pub http_client: Arc<reqwest::Client>,

    /// Cached discovery documents of remote instances
    pub metadata_cache: Arc<federation::InMemoryMetadataCache>,

    pub resolver: Arc<federation::Resolver>,
    pub verifier: Arc<federation::Verifier>,
    pub outbound: Arc<federation::OutboundService>,
    pub inbound: Arc<service::InboundService>,
    pub federation_config: Arc<service::FederationConfigService>,

    /// Publishing half of the federation event channel
    pub events: federation::EventBus,

    pub content: Arc<dyn data::ContentRepository>,
    pub identity: Arc<dyn data::IdentityRepository>,
    pub friend_links: Arc<dyn data::FriendLinkRepository>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Ensure the federation config row (and key pair)
    /// 3. Build the HTTP client
    /// 4. Wire resolver, verifier and services
    /// 5. Start the federation event subscriber
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // 2. Federation config row
        let federation_config = Arc::new(service::FederationConfigService::new(db.clone()));
        let settings = federation_config.ensure_initialized(&config).await?;
        tracing::info!(
            enabled = settings.enabled,
            instance_url = ?settings.instance_url(),
            "Federation config ready"
        );

        // 3. Initialize HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent(config.federation.user_agent.clone())
                .timeout(config.federation.http_timeout())
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 4. Federation machinery
        let metadata_cache = Arc::new(federation::InMemoryMetadataCache::new());
        let resolver = Arc::new(federation::Resolver::new(
            http_client.clone(),
            Some(metadata_cache.clone() as Arc<dyn federation::MetadataCache>),
            config.federation.cache_ttls(),
        ));
        let verifier = Arc::new(federation::Verifier::new(
            resolver.clone(),
            config.federation.allowed_skew(),
        ));
        let outbound = Arc::new(federation::OutboundService::new(
            db.clone(),
            resolver.clone(),
            http_client.clone(),
        ));

        let content: Arc<dyn data::ContentRepository> = db.clone();
        let identity: Arc<dyn data::IdentityRepository> = db.clone();
        let friend_links: Arc<dyn data::FriendLinkRepository> = db.clone();

        let inbound = Arc::new(service::InboundService::new(
            db.clone(),
            resolver.clone(),
            content.clone(),
            identity.clone(),
            friend_links.clone(),
        ));

        // 5. Event subscriber
        let (events, receiver) = federation::EventBus::new();
        federation::register_subscribers(receiver, outbound.clone());

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            http_client,
            metadata_cache,
            resolver,
            verifier,
            outbound,
            inbound,
            federation_config,
            events,
            content,
            identity,
            friend_links,
        })
    }
}

/// Upper bound for request bodies; federation payloads are small JSON
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    let admin_auth = middleware::from_fn_with_state(state.clone(), auth::require_admin_token);
    let admin_routes = api::admin_router().layer(admin_auth.clone());
    let metrics_routes = api::metrics_router().layer(admin_auth);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .nest("/api/federation", api::federation_router())
        .nest("/admin/federation", admin_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(track_http_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Count and time every request
async fn track_http_metrics(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

    let method = request.method().as_str().to_owned();
    let timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method.as_str()])
        .start_timer();

    let response = next.run(request).await;

    timer.observe_duration();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();

    response
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
