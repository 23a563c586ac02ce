//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::federation::CacheTtls;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationOptions,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "blog.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://blog.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Federation runtime options
///
/// These tune the protocol machinery. The federation settings that peers
/// see (instance name, keys, policies) live in the database and are only
/// seeded from `bootstrap`.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationOptions {
    /// Timeout for every outbound HTTP call (discovery and actions)
    pub http_timeout_seconds: u64,
    /// Accepted clock difference for the `Date` header
    pub allowed_skew_seconds: u64,
    pub manifest_ttl_seconds: u64,
    pub public_key_ttl_seconds: u64,
    pub endpoints_ttl_seconds: u64,
    /// How often expired metadata cache entries are dropped
    pub cache_prune_interval_seconds: u64,
    /// User-Agent for outbound requests
    pub user_agent: String,
    /// Initial settings written when no federation config row exists
    #[serde(default)]
    pub bootstrap: FederationBootstrapConfig,
}

impl FederationOptions {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn allowed_skew(&self) -> chrono::Duration {
        i64::try_from(self.allowed_skew_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            manifest: Duration::from_secs(self.manifest_ttl_seconds),
            public_key: Duration::from_secs(self.public_key_ttl_seconds),
            endpoints: Duration::from_secs(self.endpoints_ttl_seconds),
        }
    }
}

/// Seed values for the federation config row
#[derive(Debug, Clone, Deserialize)]
pub struct FederationBootstrapConfig {
    #[serde(default)]
    pub enabled: bool,
    pub instance_name: Option<String>,
    /// Public URL of this instance (falls back to `server.base_url()`)
    pub instance_url: Option<String>,
    #[serde(default = "default_true")]
    pub allow_inbound: bool,
    #[serde(default = "default_true")]
    pub allow_outbound: bool,
    #[serde(default = "default_true")]
    pub require_https: bool,
    /// Policy JSON, e.g. `{"auto_approve_friendlink": true}`
    pub default_policies: Option<String>,
}

impl Default for FederationBootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            instance_name: None,
            instance_url: None,
            allow_inbound: true,
            allow_outbound: true,
            require_https: true,
            default_policies: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bearer token required by `/admin/federation/*`
    pub api_token: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (BLOGFED__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost:8080")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/blogfed.db")?
            .set_default("federation.http_timeout_seconds", 10)?
            .set_default("federation.allowed_skew_seconds", 300)?
            .set_default("federation.manifest_ttl_seconds", 3600)?
            .set_default("federation.public_key_ttl_seconds", 86400)?
            .set_default("federation.endpoints_ttl_seconds", 3600)?
            .set_default("federation.cache_prune_interval_seconds", 600)?
            .set_default(
                "federation.user_agent",
                concat!("Blogfed/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (BLOGFED__*)
            .add_source(
                Environment::with_prefix("BLOGFED")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Public URL this instance federates as, before the database row
    /// overrides it.
    pub fn default_instance_url(&self) -> String {
        self.federation
            .bootstrap
            .instance_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.server.base_url())
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_ADMIN_TOKEN_BYTES: usize = 16;
        const MAX_ALLOWED_SKEW_SECONDS: u64 = 86_400;

        if self.admin.api_token.trim().as_bytes().len() < MIN_ADMIN_TOKEN_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "admin.api_token must be at least {} bytes",
                MIN_ADMIN_TOKEN_BYTES
            )));
        }

        if self.federation.http_timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "federation.http_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.allowed_skew_seconds == 0
            || self.federation.allowed_skew_seconds > MAX_ALLOWED_SKEW_SECONDS
        {
            return Err(crate::error::AppError::Config(format!(
                "federation.allowed_skew_seconds must be between 1 and {}",
                MAX_ALLOWED_SKEW_SECONDS
            )));
        }

        if let Some(policies) = self.federation.bootstrap.default_policies.as_deref() {
            if serde_json::from_str::<serde_json::Value>(policies).is_err() {
                tracing::warn!(
                    "federation.bootstrap.default_policies is not valid JSON; defaults will apply"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost:8080".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/blogfed-test.db"),
            },
            federation: FederationOptions {
                http_timeout_seconds: 10,
                allowed_skew_seconds: 300,
                manifest_ttl_seconds: 3600,
                public_key_ttl_seconds: 86_400,
                endpoints_ttl_seconds: 3600,
                cache_prune_interval_seconds: 600,
                user_agent: "Blogfed/test".to_string(),
                bootstrap: FederationBootstrapConfig::default(),
            },
            admin: AdminConfig {
                api_token: "x".repeat(16),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_admin_token() {
        let mut config = valid_config();
        config.admin.api_token = "short".to_string();

        let error = config
            .validate()
            .expect_err("admin tokens shorter than 16 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("admin.api_token")
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.federation.http_timeout_seconds = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_skew() {
        let mut config = valid_config();
        config.federation.allowed_skew_seconds = 10_000_000_000_000_000;

        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::Config(message))
                if message.contains("allowed_skew_seconds")
        ));
        // Conversion saturates instead of panicking
        assert_eq!(config.federation.allowed_skew(), chrono::Duration::MAX);

        config.federation.allowed_skew_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn allowed_skew_follows_configuration() {
        let config = valid_config();
        assert_eq!(config.federation.allowed_skew(), chrono::Duration::seconds(300));
    }

    #[test]
    fn instance_url_falls_back_to_server_base_url() {
        let mut config = valid_config();
        assert_eq!(config.default_instance_url(), "http://localhost:8080");

        config.federation.bootstrap.instance_url = Some("https://blog.example.com/".to_string());
        assert_eq!(config.default_instance_url(), "https://blog.example.com");
    }

    #[test]
    fn cache_ttls_follow_configuration() {
        let ttls = valid_config().federation.cache_ttls();
        assert_eq!(ttls.manifest, Duration::from_secs(3600));
        assert_eq!(ttls.public_key, Duration::from_secs(86_400));
        assert_eq!(ttls.endpoints, Duration::from_secs(3600));
    }
}
