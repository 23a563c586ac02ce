//! E2E tests for the public timeline, post detail and timeline sync

mod common;

use blogfed::data::NewArticle;
use common::TestServer;
use serde_json::{Value, json};

async fn get(server: &TestServer, path: &str) -> (reqwest::StatusCode, Value) {
    let response = server.client.get(server.url(path)).send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_timeline_pages_published_posts() {
    let server = TestServer::new().await;
    for short_url in ["one", "two", "three"] {
        server.seed_article("author", short_url).await;
    }
    let (author, _) = server.seed_article("author", "four").await;
    server
        .state
        .db
        .insert_article(&NewArticle {
            author_id: author.id,
            title: "Draft".to_string(),
            summary: "Not yet".to_string(),
            lead_in: None,
            cover: None,
            short_url: "draft".to_string(),
            is_published: false,
        })
        .await
        .unwrap();

    let (status, body) = get(&server, "/api/federation/timeline/posts?per_page=3").await;
    assert_eq!(status, 200);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["total"], 4);
    assert_eq!(body["data"]["page"], 1);
    assert_eq!(body["data"]["per_page"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 3);

    let (_, body) = get(&server, "/api/federation/timeline/posts?per_page=3&page=2").await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0]["url"].as_str().unwrap().starts_with(&server.addr));
    assert_eq!(items[0]["author"]["name"], "author nickname");
}

#[tokio::test]
async fn test_timeline_rejects_bad_time_filter() {
    let server = TestServer::new().await;

    let (status, body) = get(&server, "/api/federation/timeline/posts?since=last-week").await;
    assert_eq!(status, 400);
    assert_eq!(body["bizErr"], "PARAMS_ERROR");

    let (status, body) = get(
        &server,
        "/api/federation/timeline/posts?since=2000-01-01T00:00:00Z&per_page=500",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["per_page"], 100);
}

#[tokio::test]
async fn test_post_detail_by_id_and_short_url() {
    let server = TestServer::new().await;
    let (_, first) = server.seed_article("author", "first").await;
    server.seed_article("author", "second").await;

    let (status, body) = get(&server, "/api/federation/posts/first").await;
    assert_eq!(status, 200);
    let post = &body["data"]["post"];
    assert_eq!(post["id"], first.id.to_string());
    assert_eq!(post["url"], format!("{}/posts/first", server.addr));
    assert_eq!(post["allow_citation"], true);

    let related = body["data"]["related_posts"].as_array().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0]["title"], "Post second");

    let (status, body) = get(&server, &format!("/api/federation/posts/{}", first.id)).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["post"]["title"], "Post first");

    let (status, body) = get(&server, "/api/federation/posts/missing").await;
    assert_eq!(status, 404);
    assert_eq!(body["bizErr"], "NOT_FOUND");
}

#[tokio::test]
async fn test_instance_timeline_sync_fills_post_cache() {
    let local = TestServer::new().await;
    let peer = TestServer::new().await;
    peer.seed_article("author", "alpha").await;
    peer.seed_article("author", "beta").await;

    // The peer becomes known locally by proposing a friend link
    let (status, _) = peer
        .admin_post("/friendlinks/request", json!({ "target_url": local.addr }))
        .await;
    assert_eq!(status, 200);

    let (status, body) = local.admin_get("/instances").await;
    assert_eq!(status, 200);
    let instances = body["data"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["base_url"], peer.addr);
    let instance_id = instances[0]["id"].as_i64().unwrap();

    let (status, body) = local
        .admin_post(&format!("/instances/{}/sync", instance_id), json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["synced"], 2);

    // Syncing again updates in place
    let (_, body) = local
        .admin_post(&format!("/instances/{}/sync", instance_id), json!({}))
        .await;
    assert_eq!(body["data"]["synced"], 2);

    let cached = local.state.db.list_recent_federated_posts(10).await.unwrap();
    assert_eq!(cached.len(), 2);
    assert!(cached.iter().all(|post| post.instance_id == instance_id));
    assert!(
        cached
            .iter()
            .any(|post| post.url == format!("{}/posts/alpha", peer.addr))
    );
}

#[tokio::test]
async fn test_sync_unknown_instance_is_404() {
    let server = TestServer::new().await;

    let (status, _) = server.admin_post("/instances/999/sync", json!({})).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_registering_instance_twice_keeps_one_row() {
    let local = TestServer::new().await;
    let peer = TestServer::new().await;

    let (status, first) = local
        .admin_post("/instances", json!({ "target_url": format!("{}/", peer.addr) }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(first["data"]["base_url"], peer.addr);
    assert_eq!(first["data"]["status"], "pending");
    assert!(first["data"]["public_key"].as_str().unwrap().contains("PUBLIC KEY"));

    let (_, second) = local
        .admin_post("/instances", json!({ "target_url": peer.addr }))
        .await;
    assert_eq!(second["data"]["id"], first["data"]["id"]);

    let (_, list) = local.admin_get("/instances").await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_instance_posts_and_refresh() {
    let local = TestServer::new().await;
    let peer = TestServer::new().await;
    peer.seed_article("author", "alpha").await;
    peer.seed_article("author", "beta").await;

    let (status, body) = local
        .admin_post("/instances", json!({ "target_url": peer.addr }))
        .await;
    assert_eq!(status, 200);
    let instance_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = local
        .admin_get(&format!("/instances/{}/posts", instance_id))
        .await;
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    local
        .admin_post(&format!("/instances/{}/sync", instance_id), json!({}))
        .await;

    let (_, body) = local
        .admin_get(&format!("/instances/{}/posts?limit=1", instance_id))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = local
        .admin_get(&format!("/instances/{}/posts", instance_id))
        .await;
    let posts = body["data"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|post| post["instance_id"] == instance_id));

    let (status, body) = local
        .admin_get(&format!("/instances/{}/posts?since=yesterday", instance_id))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["bizErr"], "PARAMS_ERROR");

    // Refresh keeps the row and its status
    let (status, body) = local
        .admin_post(&format!("/instances/{}/refresh", instance_id), json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["id"], instance_id);
    assert_eq!(body["data"]["status"], "pending");

    let (status, _) = local.admin_get("/instances/999/posts").await;
    assert_eq!(status, 404);
    let (status, _) = local.admin_post("/instances/999/refresh", json!({})).await;
    assert_eq!(status, 404);
}
