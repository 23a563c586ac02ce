//! E2E tests for the blog-federation discovery documents

mod common;

use common::{ADMIN_TOKEN, TestServer};
use serde_json::Value;

async fn get_json(server: &TestServer, path: &str) -> (reqwest::StatusCode, Option<Value>) {
    let response = server.client.get(server.url(path)).send().await.unwrap();
    let status = response.status();
    let body = if status.is_success() {
        Some(response.json().await.unwrap())
    } else {
        None
    };
    (status, body)
}

#[tokio::test]
async fn test_manifest_describes_instance() {
    let server = TestServer::with_policies(Some(r#"{"allow_mention": false}"#)).await;

    let (status, manifest) = get_json(&server, "/.well-known/blog-federation/manifest.json").await;
    assert_eq!(status, 200);
    let manifest = manifest.unwrap();

    // Served bare, not wrapped in the envelope
    assert!(manifest.get("code").is_none());
    assert_eq!(manifest["protocol_version"], "1.0.0");
    assert_eq!(manifest["instance"]["url"], server.addr);
    assert_eq!(manifest["software"]["name"], "blogfed");
    assert_eq!(manifest["policies"]["allow_citation"], true);
    assert_eq!(manifest["policies"]["allow_mention"], false);
    assert_eq!(manifest["policies"]["require_https"], false);

    let features: Vec<&str> = manifest["features"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(features.contains(&"friendlink-timeline"));
    assert!(features.contains(&"cross-citation"));
    assert!(!features.contains(&"cross-mention"));
}

#[tokio::test]
async fn test_public_key_document() {
    let server = TestServer::new().await;

    let (status, document) =
        get_json(&server, "/.well-known/blog-federation/public-key.json").await;
    assert_eq!(status, 200);
    let document = document.unwrap();

    assert_eq!(
        document["key_id"],
        format!("{}/.well-known/blog-federation/public-key.json", server.addr)
    );
    assert_eq!(document["algorithm"], "rsa-sha256");
    assert!(
        document["public_key"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----")
    );
}

#[tokio::test]
async fn test_endpoints_document() {
    let server = TestServer::new().await;

    let (status, document) = get_json(&server, "/.well-known/blog-federation/endpoints.json").await;
    assert_eq!(status, 200);
    let document = document.unwrap();

    assert_eq!(document["base_url"], format!("{}/api/federation", server.addr));
    assert_eq!(document["endpoints"]["citation_request"], "/citations/request");
    assert_eq!(document["endpoints"]["mention_notify"], "/mentions/notify");
    assert_eq!(document["endpoints"]["friendlink_request"], "/friendlinks/request");
    assert_eq!(document["endpoints"]["timeline"], "/timeline/posts");
    assert_eq!(document["endpoints"]["post_detail"], "/posts/{id}");
}

#[tokio::test]
async fn test_documents_hidden_when_disabled() {
    let server = TestServer::new().await;

    let response = server
        .client
        .put(server.url("/admin/federation/config"))
        .bearer_auth(ADMIN_TOKEN)
        .json(&serde_json::json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    for file in ["manifest.json", "public-key.json", "endpoints.json"] {
        let (status, _) = get_json(&server, &format!("/.well-known/blog-federation/{}", file)).await;
        assert_eq!(status, 404, "{} should be hidden", file);
    }
}

#[tokio::test]
async fn test_remote_check_fetches_peer_documents() {
    let local = TestServer::new().await;
    let peer = TestServer::new().await;

    let (status, body) = local
        .admin_get(&format!(
            "/remote/check?target_url={}",
            urlencoding::encode(&format!("{}/", peer.addr))
        ))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["base_url"], peer.addr);
    assert_eq!(body["data"]["manifest"]["instance"]["url"], peer.addr);
    assert_eq!(
        body["data"]["endpoints"]["base_url"],
        format!("{}/api/federation", peer.addr)
    );
    assert!(body["data"]["public_key"]["public_key"].is_string());
}

#[tokio::test]
async fn test_remote_check_reports_unreachable_peer() {
    let local = TestServer::new().await;

    // Bound then dropped: nothing listens on this port any more
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let (status, body) = local
        .admin_get(&format!(
            "/remote/check?target_url={}",
            urlencoding::encode(&format!("http://{}", closed))
        ))
        .await;

    assert_eq!(status, 502);
    assert_eq!(body["bizErr"], "BAD_GATEWAY");
}
