mod common;

use knowdose_server::{AppConfig, build_app};
use serde_json::Value;

#[tokio::test]
async fn health_and_fallback() {
    let server = common::spawn(build_app(&AppConfig::default()).expect("build app")).await;
    let client = reqwest::Client::new();

    // GET /health needs no tenant header
    let resp = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"ok": true}));

    // Unknown paths render the JSON 404
    let resp = client.get(server.url("/nope")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Not found");

    // Unsupported method on a known path
    let resp = client
        .patch(server.url("/api/settings"))
        .header("x-user-id", common::USER_A)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);

    server.stop().await;
}

#[tokio::test]
async fn request_id_is_preserved_or_generated() {
    let server = common::spawn(build_app(&AppConfig::default()).expect("build app")).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/health"))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-123");

    let resp = client.get(server.url("/health")).send().await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    server.stop().await;
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let server = common::spawn(build_app(&AppConfig::default()).expect("build app")).await;
    let client = reqwest::Client::new();

    let resp = client
        .request(reqwest::Method::OPTIONS, server.url("/api/medications"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type,x-user-id")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let resp = client
        .get(server.url("/health"))
        .header("origin", "https://app.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    server.stop().await;
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let mut cfg = AppConfig::default();
    cfg.server.body_limit_bytes = 1024;
    let server = common::spawn_config(&cfg).await;

    let notes = "x".repeat(4096);
    let resp = reqwest::Client::new()
        .post(server.url("/api/medications"))
        .header("x-user-id", common::USER_A)
        .json(&serde_json::json!({ "dosage": notes }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);

    server.stop().await;
}
