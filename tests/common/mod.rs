//! Common test utilities for E2E tests

#![allow(dead_code)]

use blogfed::data::{Article, NewArticle, User};
use blogfed::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADMIN_TOKEN: &str = "test-admin-token-0123456789";

/// Test server instance
///
/// Serves on a real port with federation enabled over plain http so that
/// two servers can federate with each other.
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server with default policies
    pub async fn new() -> Self {
        Self::with_policies(None).await
    }

    /// Create a new test server with a policy JSON, e.g.
    /// `{"auto_approve_friendlink": true}`
    pub async fn with_policies(policies: Option<&str>) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Bind first; the instance URL must carry the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: addr.port(),
                domain: addr.to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            federation: config::FederationOptions {
                http_timeout_seconds: 5,
                allowed_skew_seconds: 300,
                manifest_ttl_seconds: 3600,
                public_key_ttl_seconds: 86400,
                endpoints_ttl_seconds: 3600,
                cache_prune_interval_seconds: 600,
                user_agent: "Blogfed-Test/0.1".to_string(),
                bootstrap: config::FederationBootstrapConfig {
                    enabled: true,
                    instance_name: Some(format!("Test Blog {}", addr.port())),
                    instance_url: None,
                    allow_inbound: true,
                    allow_outbound: true,
                    require_https: false,
                    default_policies: policies.map(ToOwned::to_owned),
                },
            },
            admin: config::AdminConfig {
                api_token: ADMIN_TOKEN.to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let app = blogfed::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create a user with one published article
    pub async fn seed_article(&self, username: &str, short_url: &str) -> (User, Article) {
        let user = match self.state.db.get_user_by_username(username).await.unwrap() {
            Some(user) => user,
            None => self
                .state
                .db
                .insert_user(username, &format!("{} nickname", username))
                .await
                .unwrap(),
        };

        let article = self
            .state
            .db
            .insert_article(&NewArticle {
                author_id: user.id,
                title: format!("Post {}", short_url),
                summary: format!("Summary of {}", short_url),
                lead_in: Some("Lead-in text".to_string()),
                cover: None,
                short_url: short_url.to_string(),
                is_published: true,
            })
            .await
            .unwrap();

        (user, article)
    }

    /// GET an admin route and return the decoded envelope
    pub async fn admin_get(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .get(self.url(&format!("/admin/federation{}", path)))
            .bearer_auth(ADMIN_TOKEN)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    /// POST an admin route and return the decoded envelope
    pub async fn admin_post(&self, path: &str, body: Value) -> (reqwest::StatusCode, Value) {
        let response = self
            .client
            .post(self.url(&format!("/admin/federation{}", path)))
            .bearer_auth(ADMIN_TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}
