//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with embedded migrations.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Result of recording an inbound friend link request
#[derive(Debug, Clone)]
pub struct RecordedApplication {
    pub instance: FederationInstance,
    pub application: FriendLinkApplication,
    /// Whether a row for the requester URL existed before
    pub existed: bool,
}

const INSTANCE_UPSERT_SQL: &str = r#"
    INSERT INTO federation_instances (
        base_url, name, description, protocol_version, public_key, key_id,
        features, policies, endpoints, status, last_seen_at, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
    ON CONFLICT(base_url) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        protocol_version = excluded.protocol_version,
        public_key = excluded.public_key,
        key_id = excluded.key_id,
        features = excluded.features,
        policies = excluded.policies,
        endpoints = excluded.endpoints,
        last_seen_at = excluded.last_seen_at,
        updated_at = excluded.updated_at
    RETURNING *
"#;

async fn upsert_instance_with<'e, E>(
    executor: E,
    snapshot: &InstanceSnapshot,
) -> Result<FederationInstance, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, FederationInstance>(INSTANCE_UPSERT_SQL)
        .bind(&snapshot.base_url)
        .bind(&snapshot.name)
        .bind(&snapshot.description)
        .bind(&snapshot.protocol_version)
        .bind(&snapshot.public_key)
        .bind(&snapshot.key_id)
        .bind(&snapshot.features)
        .bind(&snapshot.policies)
        .bind(&snapshot.endpoints)
        .bind(snapshot.seen_at)
        .bind(snapshot.seen_at)
        .bind(snapshot.seen_at)
        .fetch_one(executor)
        .await
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates database file if it doesn't exist.
    /// Runs migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Federation config (single row)
    // =========================================================================

    pub async fn get_federation_config(&self) -> Result<Option<FederationConfig>, AppError> {
        let config = sqlx::query_as::<_, FederationConfig>(
            "SELECT * FROM federation_config WHERE id = ?",
        )
        .bind(FederationConfig::SINGLETON_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(config)
    }

    /// Insert the config row only when none exists.
    ///
    /// # Returns
    /// `true` if inserted, `false` if a row already existed.
    pub async fn insert_federation_config_if_absent(
        &self,
        config: &FederationConfig,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO federation_config (
                id, enabled, instance_name, instance_url, public_key, private_key,
                signature_alg, require_https, allow_inbound, allow_outbound,
                default_policies, rate_limits, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(FederationConfig::SINGLETON_ID)
        .bind(config.enabled)
        .bind(&config.instance_name)
        .bind(&config.instance_url)
        .bind(&config.public_key)
        .bind(&config.private_key)
        .bind(&config.signature_alg)
        .bind(config.require_https)
        .bind(config.allow_inbound)
        .bind(config.allow_outbound)
        .bind(&config.default_policies)
        .bind(&config.rate_limits)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_federation_config(&self, config: &FederationConfig) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE federation_config SET
                enabled = ?, instance_name = ?, instance_url = ?, public_key = ?,
                private_key = ?, signature_alg = ?, require_https = ?,
                allow_inbound = ?, allow_outbound = ?, default_policies = ?,
                rate_limits = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(config.enabled)
        .bind(&config.instance_name)
        .bind(&config.instance_url)
        .bind(&config.public_key)
        .bind(&config.private_key)
        .bind(&config.signature_alg)
        .bind(config.require_https)
        .bind(config.allow_inbound)
        .bind(config.allow_outbound)
        .bind(&config.default_policies)
        .bind(&config.rate_limits)
        .bind(config.updated_at)
        .bind(FederationConfig::SINGLETON_ID)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Federation instances
    // =========================================================================

    pub async fn get_federation_instance(
        &self,
        id: i64,
    ) -> Result<Option<FederationInstance>, AppError> {
        let instance = sqlx::query_as::<_, FederationInstance>(
            "SELECT * FROM federation_instances WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(instance)
    }

    /// Insert or refresh an instance keyed by its base URL.
    ///
    /// A new row starts as `pending`; an existing row keeps its status and
    /// gets every snapshot field plus `last_seen_at` refreshed.
    pub async fn upsert_federation_instance(
        &self,
        snapshot: &InstanceSnapshot,
    ) -> Result<FederationInstance, AppError> {
        Ok(upsert_instance_with(&self.pool, snapshot).await?)
    }

    pub async fn update_federation_instance_status(
        &self,
        id: i64,
        status: InstanceStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE federation_instances SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_federation_instances(&self) -> Result<Vec<FederationInstance>, AppError> {
        let instances = sqlx::query_as::<_, FederationInstance>(
            "SELECT * FROM federation_instances ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    pub async fn list_active_federation_instances(
        &self,
    ) -> Result<Vec<FederationInstance>, AppError> {
        let instances = sqlx::query_as::<_, FederationInstance>(
            "SELECT * FROM federation_instances WHERE status = ? ORDER BY id ASC",
        )
        .bind(InstanceStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(instances)
    }

    // =========================================================================
    // Citations
    // =========================================================================

    /// Upsert the source instance and insert the citation atomically.
    pub async fn record_inbound_citation(
        &self,
        snapshot: &InstanceSnapshot,
        citation: &NewFederatedCitation,
    ) -> Result<(FederationInstance, FederatedCitation), AppError> {
        let mut tx = self.pool.begin().await?;

        let instance = upsert_instance_with(&mut *tx, snapshot).await?;
        let approved_at = (citation.status == CitationStatus::Approved).then_some(citation.requested_at);

        let stored = sqlx::query_as::<_, FederatedCitation>(
            r#"
            INSERT INTO federated_citations (
                source_instance_id, source_post_url, source_post_title, target_article_id,
                citation_context, citation_type, status, requested_at, approved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(instance.id)
        .bind(&citation.source_post_url)
        .bind(&citation.source_post_title)
        .bind(citation.target_article_id)
        .bind(&citation.citation_context)
        .bind(&citation.citation_type)
        .bind(citation.status.as_str())
        .bind(citation.requested_at)
        .bind(approved_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((instance, stored))
    }

    pub async fn get_federated_citation(
        &self,
        id: i64,
    ) -> Result<Option<FederatedCitation>, AppError> {
        let citation = sqlx::query_as::<_, FederatedCitation>(
            "SELECT * FROM federated_citations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(citation)
    }

    pub async fn list_citations_by_target(
        &self,
        target_article_id: i64,
        status: Option<CitationStatus>,
    ) -> Result<Vec<FederatedCitation>, AppError> {
        let citations = sqlx::query_as::<_, FederatedCitation>(
            r#"
            SELECT * FROM federated_citations
            WHERE target_article_id = ? AND (? IS NULL OR status = ?)
            ORDER BY requested_at DESC, id DESC
            "#,
        )
        .bind(target_article_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(citations)
    }

    /// Move a pending citation to approved or rejected.
    ///
    /// # Returns
    /// `false` if the citation does not exist or already left `pending`.
    pub async fn update_citation_status(
        &self,
        id: i64,
        status: CitationStatus,
        reason: Option<&str>,
    ) -> Result<bool, AppError> {
        let now = Utc::now();
        let (approved_at, rejected_at, reason) = match status {
            CitationStatus::Approved => (Some(now), None, None),
            CitationStatus::Rejected => (None, Some(now), reason),
            CitationStatus::Pending => return Ok(false),
        };

        let result = sqlx::query(
            r#"
            UPDATE federated_citations
            SET status = ?, approved_at = ?, rejected_at = ?, reject_reason = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(approved_at)
        .bind(rejected_at)
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Mentions
    // =========================================================================

    /// Upsert the source instance and insert the mention atomically.
    pub async fn record_inbound_mention(
        &self,
        snapshot: &InstanceSnapshot,
        mention: &NewFederatedMention,
    ) -> Result<(FederationInstance, FederatedMention), AppError> {
        let mut tx = self.pool.begin().await?;

        let instance = upsert_instance_with(&mut *tx, snapshot).await?;

        let stored = sqlx::query_as::<_, FederatedMention>(
            r#"
            INSERT INTO federated_mentions (
                source_instance_id, source_post_url, source_post_title, mentioned_user_id,
                mention_context, mention_type, is_read, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING *
            "#,
        )
        .bind(instance.id)
        .bind(&mention.source_post_url)
        .bind(&mention.source_post_title)
        .bind(mention.mentioned_user_id)
        .bind(&mention.mention_context)
        .bind(&mention.mention_type)
        .bind(mention.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((instance, stored))
    }

    pub async fn get_federated_mention(
        &self,
        id: i64,
    ) -> Result<Option<FederatedMention>, AppError> {
        let mention =
            sqlx::query_as::<_, FederatedMention>("SELECT * FROM federated_mentions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(mention)
    }

    pub async fn list_mentions_by_user(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<FederatedMention>, AppError> {
        let mentions = sqlx::query_as::<_, FederatedMention>(
            r#"
            SELECT * FROM federated_mentions
            WHERE mentioned_user_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(mentions)
    }

    /// Flip `is_read` once, stamping `read_at`.
    ///
    /// # Returns
    /// `false` if the mention does not exist or was already read.
    pub async fn mark_mention_read(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE federated_mentions SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Remote post cache
    // =========================================================================

    /// Insert or refresh cached remote posts keyed by URL.
    pub async fn upsert_federated_posts(&self, posts: &[FederatedPostCache]) -> Result<(), AppError> {
        if posts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for post in posts {
            sqlx::query(
                r#"
                INSERT INTO federated_post_cache (
                    instance_id, remote_post_id, url, title, summary, content_preview,
                    author, tags, categories, published_at, updated_at, cover_image,
                    language, allow_citation, allow_comment, etag, last_modified, cached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    instance_id = excluded.instance_id,
                    remote_post_id = excluded.remote_post_id,
                    title = excluded.title,
                    summary = excluded.summary,
                    content_preview = excluded.content_preview,
                    author = excluded.author,
                    tags = excluded.tags,
                    categories = excluded.categories,
                    published_at = excluded.published_at,
                    updated_at = excluded.updated_at,
                    cover_image = excluded.cover_image,
                    language = excluded.language,
                    allow_citation = excluded.allow_citation,
                    allow_comment = excluded.allow_comment,
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    cached_at = excluded.cached_at
                "#,
            )
            .bind(post.instance_id)
            .bind(&post.remote_post_id)
            .bind(&post.url)
            .bind(&post.title)
            .bind(&post.summary)
            .bind(&post.content_preview)
            .bind(&post.author)
            .bind(&post.tags)
            .bind(&post.categories)
            .bind(post.published_at)
            .bind(post.updated_at)
            .bind(&post.cover_image)
            .bind(&post.language)
            .bind(post.allow_citation)
            .bind(post.allow_comment)
            .bind(&post.etag)
            .bind(&post.last_modified)
            .bind(post.cached_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    pub async fn list_recent_federated_posts(
        &self,
        limit: i64,
    ) -> Result<Vec<FederatedPostCache>, AppError> {
        let posts = sqlx::query_as::<_, FederatedPostCache>(
            r#"
            SELECT * FROM federated_post_cache
            ORDER BY COALESCE(published_at, cached_at) DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    pub async fn list_federated_posts_by_instance(
        &self,
        instance_id: i64,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<FederatedPostCache>, AppError> {
        let posts = sqlx::query_as::<_, FederatedPostCache>(
            r#"
            SELECT * FROM federated_post_cache
            WHERE instance_id = ? AND (? IS NULL OR published_at >= ?)
            ORDER BY COALESCE(published_at, cached_at) DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(instance_id)
        .bind(since)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn insert_user(&self, username: &str, nickname: &str) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, nickname) VALUES (?, ?) RETURNING *",
        )
        .bind(username)
        .bind(nickname)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    // =========================================================================
    // Articles
    // =========================================================================

    pub async fn insert_article(&self, article: &NewArticle) -> Result<Article, AppError> {
        let now = Utc::now();
        let stored = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (
                author_id, title, summary, lead_in, cover, short_url, is_published,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(article.author_id)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.lead_in)
        .bind(&article.cover)
        .bind(&article.short_url)
        .bind(article.is_published)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>, AppError> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(article)
    }

    pub async fn get_article_by_short_url(
        &self,
        short_url: &str,
    ) -> Result<Option<Article>, AppError> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE short_url = ?")
            .bind(short_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(article)
    }

    /// Page through published articles, newest first.
    ///
    /// # Returns
    /// The page and the total number of matching articles.
    pub async fn list_public_articles(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Article>, i64), AppError> {
        let offset = (page.max(1) - 1) * per_page;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM articles
            WHERE is_published = 1
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(until)
        .bind(until)
        .fetch_one(&self.pool)
        .await?;

        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE is_published = 1
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(since)
        .bind(since)
        .bind(until)
        .bind(until)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((articles, total))
    }

    /// Other published articles, same author first, then newest.
    pub async fn list_related_articles(
        &self,
        article: &Article,
        limit: i64,
    ) -> Result<Vec<Article>, AppError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE is_published = 1 AND id != ?
            ORDER BY (author_id = ?) DESC, created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(article.id)
        .bind(article.author_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    // =========================================================================
    // Friend links
    // =========================================================================

    pub async fn get_friend_link_by_url(&self, url: &str) -> Result<Option<FriendLink>, AppError> {
        let link = sqlx::query_as::<_, FriendLink>("SELECT * FROM friend_links WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(link)
    }

    /// Insert a friend link unless one with the same URL exists.
    ///
    /// # Returns
    /// The stored link, new or pre-existing.
    pub async fn insert_friend_link_if_absent(
        &self,
        link: &NewFriendLink,
    ) -> Result<FriendLink, AppError> {
        sqlx::query(
            r#"
            INSERT INTO friend_links (
                name, url, description, rss_url, kind, sync_mode, instance_id,
                is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&link.name)
        .bind(&link.url)
        .bind(&link.description)
        .bind(&link.rss_url)
        .bind(&link.kind)
        .bind(&link.sync_mode)
        .bind(link.instance_id)
        .bind(link.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_friend_link_by_url(&link.url)
            .await?
            .ok_or(AppError::NotFound)
    }

    // =========================================================================
    // Friend link applications
    // =========================================================================

    pub async fn get_friend_link_application_by_url(
        &self,
        url: &str,
    ) -> Result<Option<FriendLinkApplication>, AppError> {
        let application = sqlx::query_as::<_, FriendLinkApplication>(
            "SELECT * FROM friend_link_applications WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(application)
    }

    /// Upsert the requester instance and its application atomically.
    ///
    /// A repeated request refreshes every mutable field and resets the
    /// application to `pending`.
    pub async fn record_friend_link_request(
        &self,
        snapshot: &InstanceSnapshot,
        application: &NewFriendLinkApplication,
    ) -> Result<RecordedApplication, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let instance = upsert_instance_with(&mut *tx, snapshot).await?;

        let existed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM friend_link_applications WHERE url = ?)",
        )
        .bind(&application.url)
        .fetch_one(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, FriendLinkApplication>(
            r#"
            INSERT INTO friend_link_applications (
                name, url, description, apply_channel, requested_sync_mode, rss_url,
                instance_url, manifest, signature_key_id, signature_verified, message,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                apply_channel = excluded.apply_channel,
                requested_sync_mode = excluded.requested_sync_mode,
                rss_url = excluded.rss_url,
                instance_url = excluded.instance_url,
                manifest = excluded.manifest,
                signature_key_id = excluded.signature_key_id,
                signature_verified = excluded.signature_verified,
                message = excluded.message,
                status = 'pending',
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&application.name)
        .bind(&application.url)
        .bind(&application.description)
        .bind(&application.apply_channel)
        .bind(&application.requested_sync_mode)
        .bind(&application.rss_url)
        .bind(&application.instance_url)
        .bind(&application.manifest)
        .bind(&application.signature_key_id)
        .bind(application.signature_verified)
        .bind(&application.message)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RecordedApplication {
            instance,
            application: stored,
            existed,
        })
    }

    pub async fn update_friend_link_application_status(
        &self,
        id: i64,
        status: ApplicationStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE friend_link_applications SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Approve an application, create its friend link and activate the
    /// instance in one transaction.
    ///
    /// The friend link insert is idempotent by URL. Nothing is kept when the
    /// application or instance row is missing.
    pub async fn accept_friend_link_application(
        &self,
        application_id: i64,
        instance_id: i64,
        link: &NewFriendLink,
    ) -> Result<FriendLink, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO friend_links (
                name, url, description, rss_url, kind, sync_mode, instance_id,
                is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&link.name)
        .bind(&link.url)
        .bind(&link.description)
        .bind(&link.rss_url)
        .bind(&link.kind)
        .bind(&link.sync_mode)
        .bind(link.instance_id)
        .bind(link.is_active)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let approved =
            sqlx::query("UPDATE friend_link_applications SET status = ?, updated_at = ? WHERE id = ?")
                .bind(ApplicationStatus::Approved.as_str())
                .bind(now)
                .bind(application_id)
                .execute(&mut *tx)
                .await?;
        if approved.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        let activated =
            sqlx::query("UPDATE federation_instances SET status = ?, updated_at = ? WHERE id = ?")
                .bind(InstanceStatus::Active.as_str())
                .bind(now)
                .bind(instance_id)
                .execute(&mut *tx)
                .await?;
        if activated.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        let stored = sqlx::query_as::<_, FriendLink>("SELECT * FROM friend_links WHERE url = ?")
            .bind(&link.url)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(stored)
    }
}
