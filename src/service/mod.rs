//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the database, the resolver and the federation
//! config row.

mod federation_config;
mod inbound;

pub use federation_config::{FederationConfigService, FederationConfigUpdate};
pub use inbound::InboundService;
