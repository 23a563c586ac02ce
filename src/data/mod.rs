//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Collaborator interfaces (articles, users, friend links)

mod database;
mod models;
mod repository;

pub use database::{Database, RecordedApplication};
pub use models::*;
pub use repository::{ContentRepository, FriendLinkRepository, IdentityRepository};
