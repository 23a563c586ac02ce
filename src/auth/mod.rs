//! Admin authentication
//!
//! Bearer token check for the `/admin/federation` routes.

mod middleware;

pub use middleware::require_admin_token;
