//! Public read endpoints
//!
//! - GET /api/federation/timeline/posts
//! - GET /api/federation/posts/:id
//!
//! Unsigned; peers pull these to fill their remote post caches.

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::response::{Envelope, ok};
use crate::AppState;
use crate::data::{Article, FederatedPostCache, FederationConfig};
use crate::error::AppError;
use crate::federation::{FederationPost, PostAuthor, PostDetail, TimelinePage};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;
const RELATED_POSTS_LIMIT: i64 = 6;

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub since: Option<String>,
    pub until: Option<String>,
}

/// Instance URL and citation flag used to render local articles
struct LocalInstance {
    url: String,
    allow_citation: bool,
}

async fn local_instance(state: &AppState) -> Result<LocalInstance, AppError> {
    let settings = state.federation_config.settings().await?;
    if !settings.enabled {
        return Err(AppError::NotFound);
    }
    Ok(LocalInstance {
        url: instance_url(state, &settings),
        allow_citation: settings.policy().allow_citation(),
    })
}

fn instance_url(state: &AppState, settings: &FederationConfig) -> String {
    settings
        .instance_url()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| state.config.default_instance_url())
}

/// GET /api/federation/timeline/posts
pub async fn timeline_posts(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> Result<Envelope<TimelinePage>, AppError> {
    let local = local_instance(&state).await?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let since = parse_time("since", query.since.as_deref())?;
    let until = parse_time("until", query.until.as_deref())?;

    let (articles, total) = state
        .content
        .list_public_articles_for_federation(since, until, page as i64, per_page as i64)
        .await?;

    let mut items = Vec::with_capacity(articles.len());
    for article in &articles {
        items.push(render_article(&state, &local, article).await?);
    }

    Ok(ok(TimelinePage {
        items,
        total,
        page,
        per_page,
    }))
}

/// GET /api/federation/posts/:id
///
/// `id` is a numeric article id or a short URL.
pub async fn post_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Envelope<PostDetail>, AppError> {
    let local = local_instance(&state).await?;

    let id = id.trim();
    let article = match id.parse::<i64>() {
        Ok(numeric) => state.content.get_article_by_id(numeric).await?,
        Err(_) => state.content.get_article_by_short_url(id).await?,
    }
    .filter(|article| article.is_published)
    .ok_or(AppError::NotFound)?;

    let post = render_article(&state, &local, &article).await?;

    let related = state
        .content
        .list_related_articles(&article, RELATED_POSTS_LIMIT)
        .await?;
    let related_posts = if related.is_empty() {
        state
            .db
            .list_recent_federated_posts(RELATED_POSTS_LIMIT)
            .await?
            .into_iter()
            .map(render_cached)
            .collect()
    } else {
        let mut posts = Vec::with_capacity(related.len());
        for article in &related {
            posts.push(render_article(&state, &local, article).await?);
        }
        posts
    };

    Ok(ok(PostDetail {
        post,
        related_posts,
    }))
}

pub(super) fn parse_time(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| AppError::Validation(format!("{} must be an RFC 3339 timestamp", field))),
    }
}

async fn render_article(
    state: &AppState,
    local: &LocalInstance,
    article: &Article,
) -> Result<FederationPost, AppError> {
    let author = match state.identity.find_by_id(article.author_id).await? {
        Some(user) => PostAuthor {
            name: if user.nickname.trim().is_empty() {
                user.username.clone()
            } else {
                user.nickname.clone()
            },
            url: Some(local.url.clone()),
            avatar: user.avatar,
        },
        None => PostAuthor::default(),
    };

    Ok(FederationPost {
        id: article.id.to_string(),
        url: format!("{}/posts/{}", local.url, article.short_url),
        title: article.title.clone(),
        summary: article.summary.clone(),
        content_preview: article.lead_in.clone(),
        author,
        tags: Vec::new(),
        categories: Vec::new(),
        published_at: article.created_at,
        updated_at: Some(article.updated_at),
        cover_image: article.cover.clone(),
        language: None,
        allow_citation: local.allow_citation,
        allow_comment: true,
    })
}

/// Render a cached remote post; malformed JSON columns degrade to empty values
fn render_cached(cached: FederatedPostCache) -> FederationPost {
    FederationPost {
        id: cached
            .remote_post_id
            .unwrap_or_else(|| cached.id.to_string()),
        author: serde_json::from_str(&cached.author).unwrap_or_default(),
        tags: serde_json::from_str(&cached.tags).unwrap_or_default(),
        categories: serde_json::from_str(&cached.categories).unwrap_or_default(),
        url: cached.url,
        title: cached.title,
        summary: cached.summary.unwrap_or_default(),
        content_preview: cached.content_preview,
        published_at: cached.published_at.unwrap_or(cached.cached_at),
        updated_at: cached.updated_at,
        cover_image: cached.cover_image,
        language: cached.language,
        allow_citation: cached.allow_citation,
        allow_comment: cached.allow_comment,
    }
}
