//! API layer
//!
//! HTTP handlers for:
//! - Well-known discovery documents
//! - Signed federation actions and the public timeline
//! - Admin API
//! - Metrics (Prometheus)

mod admin;
mod federation;
pub mod metrics;
pub mod response;
mod timeline;
mod wellknown;

pub use admin::admin_router;
pub use federation::federation_router;
pub use metrics::metrics_router;
pub use response::{Envelope, Meta, ok};
pub use wellknown::wellknown_router;
