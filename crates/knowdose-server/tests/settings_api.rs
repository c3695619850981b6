mod common;

use common::{USER_A, USER_B};
use knowdose_server::AppConfig;
use reqwest::Client;
use serde_json::{Value, json};

async fn settings(client: &Client, server: &common::TestServer, user: &str) -> Value {
    let resp = client
        .get(server.url("/api/settings"))
        .header("x-user-id", user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

async fn save(client: &Client, server: &common::TestServer, user: &str, body: Value) {
    let resp = client
        .post(server.url("/api/settings"))
        .header("x-user-id", user)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn settings_default_to_empty_object() {
    let server = common::spawn_config(&AppConfig::default()).await;
    let client = Client::new();

    assert_eq!(settings(&client, &server, USER_A).await, json!({}));

    let resp = client
        .get(server.url("/api/settings"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    server.stop().await;
}

#[tokio::test]
async fn saves_are_deep_merged() {
    let server = common::spawn_config(&AppConfig::default()).await;
    let client = Client::new();

    save(&client, &server, USER_A, json!({"mealTimes": {"breakfast": "07:00", "lunch": "12:00"}})).await;
    save(
        &client,
        &server,
        USER_A,
        json!({"mealTimes": {"lunch": "12:30"}, "emailNotification": {"enabled": true}}),
    )
    .await;

    assert_eq!(
        settings(&client, &server, USER_A).await,
        json!({
            "mealTimes": {"breakfast": "07:00", "lunch": "12:30"},
            "emailNotification": {"enabled": true}
        })
    );
    assert_eq!(settings(&client, &server, USER_B).await, json!({}));

    server.stop().await;
}

#[tokio::test]
async fn nested_layout_stores_settings_per_user() {
    let mut cfg = AppConfig::default();
    cfg.storage.layout = knowdose_server::StorageLayout::Nested;
    let server = common::spawn_config(&cfg).await;
    let client = Client::new();

    save(&client, &server, USER_A, json!({"mealTimes": {"dinner": "19:30"}})).await;
    save(&client, &server, USER_B, json!({"mealTimes": {"dinner": "18:00"}})).await;

    assert_eq!(
        settings(&client, &server, USER_A).await["mealTimes"]["dinner"],
        "19:30"
    );
    assert_eq!(
        settings(&client, &server, USER_B).await["mealTimes"]["dinner"],
        "18:00"
    );

    server.stop().await;
}
