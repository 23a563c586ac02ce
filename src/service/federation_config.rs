//! Federation config service
//!
//! Owns the single federation config row: bootstrapping it on startup and
//! applying administrative updates. Key pairs are generated here whenever
//! federation is enabled without one.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::data::{Database, FederationConfig};
use crate::error::AppError;
use crate::federation::{SignatureAlgorithm, generate_key_pair};

#[cfg(test)]
const FEDERATION_KEY_BITS: usize = 1024;
#[cfg(not(test))]
const FEDERATION_KEY_BITS: usize = 2048;

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FederationConfigUpdate {
    pub enabled: Option<bool>,
    pub instance_name: Option<String>,
    pub instance_url: Option<String>,
    pub signature_alg: Option<String>,
    pub require_https: Option<bool>,
    pub allow_inbound: Option<bool>,
    pub allow_outbound: Option<bool>,
    pub default_policies: Option<serde_json::Value>,
    pub rate_limits: Option<serde_json::Value>,
}

pub struct FederationConfigService {
    db: Arc<Database>,
}

impl FederationConfigService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Current settings, or disabled settings if the row is missing
    pub async fn settings(&self) -> Result<FederationConfig, AppError> {
        Ok(self
            .db
            .get_federation_config()
            .await?
            .unwrap_or_else(FederationConfig::disabled))
    }

    /// Create the config row from the bootstrap section if absent
    ///
    /// An enabled config without a key pair gets one.
    pub async fn ensure_initialized(&self, app: &AppConfig) -> Result<FederationConfig, AppError> {
        if self.db.get_federation_config().await?.is_none() {
            let bootstrap = &app.federation.bootstrap;
            let mut seed = FederationConfig::disabled();
            seed.enabled = bootstrap.enabled;
            seed.instance_name = bootstrap
                .instance_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToOwned::to_owned);
            seed.instance_url = Some(app.default_instance_url());
            seed.require_https = bootstrap.require_https;
            seed.allow_inbound = bootstrap.allow_inbound;
            seed.allow_outbound = bootstrap.allow_outbound;
            if let Some(policies) = bootstrap.default_policies.as_deref() {
                seed.default_policies = policies.trim().to_string();
            }

            if self.db.insert_federation_config_if_absent(&seed).await? {
                tracing::info!(
                    enabled = seed.enabled,
                    instance_url = ?seed.instance_url,
                    "Federation config created"
                );
            }
        }

        let mut config = self.settings().await?;
        if self.ensure_key_pair(&mut config).await? {
            self.db.update_federation_config(&config).await?;
        }

        Ok(config)
    }

    /// Apply an administrative update
    pub async fn update(&self, update: FederationConfigUpdate) -> Result<FederationConfig, AppError> {
        if self.db.get_federation_config().await?.is_none() {
            self.db
                .insert_federation_config_if_absent(&FederationConfig::disabled())
                .await?;
        }
        let mut config = self.settings().await?;

        if let Some(enabled) = update.enabled {
            config.enabled = enabled;
        }
        if let Some(name) = update.instance_name {
            let name = name.trim();
            config.instance_name = (!name.is_empty()).then(|| name.to_string());
        }
        if let Some(url) = update.instance_url {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                config.instance_url = None;
            } else {
                validate_instance_url(url)?;
                config.instance_url = Some(url.to_string());
            }
        }
        if let Some(alg) = update.signature_alg {
            let alg = SignatureAlgorithm::parse(&alg)
                .map_err(|e| AppError::Validation(e.to_string()))?;
            config.signature_alg = alg.as_str().to_string();
        }
        if let Some(require_https) = update.require_https {
            config.require_https = require_https;
        }
        if let Some(allow_inbound) = update.allow_inbound {
            config.allow_inbound = allow_inbound;
        }
        if let Some(allow_outbound) = update.allow_outbound {
            config.allow_outbound = allow_outbound;
        }
        if let Some(policies) = update.default_policies {
            config.default_policies = json_object(policies, "default_policies")?;
        }
        if let Some(rate_limits) = update.rate_limits {
            config.rate_limits = json_object(rate_limits, "rate_limits")?;
        }

        self.ensure_key_pair(&mut config).await?;
        config.updated_at = Utc::now();
        self.db.update_federation_config(&config).await?;

        tracing::info!(
            enabled = config.enabled,
            allow_inbound = config.allow_inbound,
            allow_outbound = config.allow_outbound,
            "Federation config updated"
        );

        Ok(config)
    }

    /// Generate keys for an enabled config that lacks them
    ///
    /// # Returns
    /// `true` if `config` was changed
    async fn ensure_key_pair(&self, config: &mut FederationConfig) -> Result<bool, AppError> {
        if !config.enabled || (config.public_key().is_some() && config.private_key().is_some()) {
            return Ok(false);
        }

        let (public_key_pem, private_key_pem) =
            tokio::task::spawn_blocking(|| generate_key_pair(FEDERATION_KEY_BITS))
                .await
                .map_err(|e| AppError::Internal(e.into()))??;

        config.public_key = Some(public_key_pem);
        config.private_key = Some(private_key_pem);
        config.updated_at = Utc::now();

        tracing::info!("Federation key pair generated");
        Ok(true)
    }
}

fn validate_instance_url(url: &str) -> Result<(), AppError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {
            Ok(())
        }
        _ => Err(AppError::Validation(
            "instance_url must be an absolute http(s) URL".to_string(),
        )),
    }
}

fn json_object(value: serde_json::Value, field: &str) -> Result<String, AppError> {
    if !value.is_object() {
        return Err(AppError::Validation(format!("{} must be a JSON object", field)));
    }
    Ok(value.to_string())
}
