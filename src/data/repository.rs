//! Narrow interfaces onto the rest of the blog
//!
//! Federation only needs to look up articles, users and friend links.
//! Handlers depend on these traits; `Database` implements all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::database::Database;
use super::models::{Article, FriendLink, NewFriendLink, User};
use crate::error::AppError;

#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn get_article_by_id(&self, id: i64) -> Result<Option<Article>, AppError>;

    async fn get_article_by_short_url(&self, short_url: &str)
    -> Result<Option<Article>, AppError>;

    /// Published articles for the public timeline, newest first, with total.
    async fn list_public_articles_for_federation(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Article>, i64), AppError>;

    async fn list_related_articles(
        &self,
        article: &Article,
        limit: i64,
    ) -> Result<Vec<Article>, AppError>;
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait FriendLinkRepository: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<FriendLink>, AppError>;

    /// Create a link; creating an existing URL returns the stored link.
    async fn create(&self, link: &NewFriendLink) -> Result<FriendLink, AppError>;
}

#[async_trait]
impl ContentRepository for Database {
    async fn get_article_by_id(&self, id: i64) -> Result<Option<Article>, AppError> {
        self.get_article(id).await
    }

    async fn get_article_by_short_url(
        &self,
        short_url: &str,
    ) -> Result<Option<Article>, AppError> {
        Database::get_article_by_short_url(self, short_url).await
    }

    async fn list_public_articles_for_federation(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Article>, i64), AppError> {
        self.list_public_articles(since, until, page, per_page).await
    }

    async fn list_related_articles(
        &self,
        article: &Article,
        limit: i64,
    ) -> Result<Vec<Article>, AppError> {
        Database::list_related_articles(self, article, limit).await
    }
}

#[async_trait]
impl IdentityRepository for Database {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.get_user_by_username(username).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        self.get_user(id).await
    }
}

#[async_trait]
impl FriendLinkRepository for Database {
    async fn find_by_url(&self, url: &str) -> Result<Option<FriendLink>, AppError> {
        self.get_friend_link_by_url(url).await
    }

    async fn create(&self, link: &NewFriendLink) -> Result<FriendLink, AppError> {
        self.insert_friend_link_if_absent(link).await
    }
}
