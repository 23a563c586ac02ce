//! Federation policy
//!
//! The `default_policies` JSON blob mapped to a typed struct. Anything
//! unreadable falls back to the safe defaults: actions allowed, nothing
//! auto-approved.

use serde::{Deserialize, Serialize};

use crate::data::{CitationStatus, FederationConfig};
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_citation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_mention: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_friendlink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_friendlink_citation: Option<bool>,
}

impl FederationPolicy {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        serde_json::from_str(raw).unwrap_or_else(|error| {
            tracing::warn!(%error, "Ignoring unreadable federation policy");
            Self::default()
        })
    }

    pub fn allow_citation(&self) -> bool {
        self.allow_citation.unwrap_or(true)
    }

    pub fn allow_mention(&self) -> bool {
        self.allow_mention.unwrap_or(true)
    }

    pub fn auto_approve_friendlink(&self) -> bool {
        self.auto_approve_friendlink.unwrap_or(false)
    }

    pub fn auto_approve_friendlink_citation(&self) -> bool {
        self.auto_approve_friendlink_citation.unwrap_or(false)
    }

    /// Initial status of an inbound citation
    pub fn citation_status(&self, source_is_friend_link: bool) -> CitationStatus {
        if self.auto_approve_friendlink_citation() && source_is_friend_link {
            CitationStatus::Approved
        } else {
            CitationStatus::Pending
        }
    }
}

/// Signed inbound actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAction {
    FriendLinkRequest,
    Citation,
    Mention,
}

impl InboundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendLinkRequest => "friendlink_request",
            Self::Citation => "citation_request",
            Self::Mention => "mention_notify",
        }
    }
}

/// Config gates for an inbound action
///
/// # Returns
/// The parsed policy, for the auto-approval decisions that follow
///
/// # Errors
/// `Unauthorized` when federation or inbound traffic is disabled, or the
/// policy forbids the action
pub fn authorize_inbound(
    config: &FederationConfig,
    action: InboundAction,
) -> Result<FederationPolicy, AppError> {
    if !config.enabled {
        return Err(AppError::Unauthorized("federation disabled".to_string()));
    }

    let policy = config.policy();
    match action {
        InboundAction::Citation if !policy.allow_citation() => {
            return Err(AppError::Unauthorized("citation disabled".to_string()));
        }
        InboundAction::Mention if !policy.allow_mention() => {
            return Err(AppError::Unauthorized("mention disabled".to_string()));
        }
        _ => {}
    }

    if !config.allow_inbound {
        return Err(AppError::Unauthorized("inbound disabled".to_string()));
    }

    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_invalid_policy_uses_safe_defaults() {
        for raw in ["", "{}", "not json", "[1,2]", r#"{"allow_citation":"yes"}"#] {
            let policy = FederationPolicy::parse(raw);
            assert!(policy.allow_citation(), "{raw}");
            assert!(policy.allow_mention(), "{raw}");
            assert!(!policy.auto_approve_friendlink(), "{raw}");
            assert!(!policy.auto_approve_friendlink_citation(), "{raw}");
        }
    }

    #[test]
    fn explicit_values_are_respected() {
        let policy = FederationPolicy::parse(
            r#"{"allow_citation":false,"auto_approve_friendlink":true,"unknown":1}"#,
        );
        assert!(!policy.allow_citation());
        assert!(policy.allow_mention());
        assert!(policy.auto_approve_friendlink());
    }

    #[test]
    fn citation_auto_approval_requires_friend_link() {
        let policy = FederationPolicy {
            auto_approve_friendlink_citation: Some(true),
            ..Default::default()
        };
        assert_eq!(policy.citation_status(true), CitationStatus::Approved);
        assert_eq!(policy.citation_status(false), CitationStatus::Pending);
        assert_eq!(
            FederationPolicy::default().citation_status(true),
            CitationStatus::Pending
        );
    }

    #[test]
    fn gates_reject_disabled_federation_and_inbound() {
        let mut config = FederationConfig::disabled();
        assert!(matches!(
            authorize_inbound(&config, InboundAction::Citation),
            Err(AppError::Unauthorized(_))
        ));

        config.enabled = true;
        assert!(authorize_inbound(&config, InboundAction::Citation).is_ok());

        config.default_policies = r#"{"allow_mention":false}"#.to_string();
        match authorize_inbound(&config, InboundAction::Mention) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "mention disabled"),
            other => panic!("expected mention disabled, got: {other:?}"),
        }

        config.allow_inbound = false;
        match authorize_inbound(&config, InboundAction::FriendLinkRequest) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "inbound disabled"),
            other => panic!("expected inbound disabled, got: {other:?}"),
        }
    }
}
