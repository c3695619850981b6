use knowdose_db_firestore::{Credentials, FirestoreConfig, FirestoreStore, MAX_BATCH_WRITES};
use knowdose_storage::{CollectionPath, Direction, DocumentStore, Query};
use serde_json::{Map, Value, json};
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCS: &str = "/v1/projects/demo/databases/(default)/documents";

fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

fn store_for(server: &MockServer) -> FirestoreStore {
    FirestoreStore::new(FirestoreConfig::emulator("demo", &server.uri())).unwrap()
}

#[tokio::test]
async fn add_encodes_fields_and_returns_generated_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}/medications")))
        .and(body_partial_json(json!({
            "fields": {
                "userId": {"stringValue": "u-1"},
                "dailyFrequency": {"integerValue": "3"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/medications/abc123",
            "fields": {"userId": {"stringValue": "u-1"}},
            "createTime": "2024-05-01T08:00:00.000000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let created = store
        .add(
            &CollectionPath::root("medications"),
            obj(json!({"userId": "u-1", "dailyFrequency": 3})),
        )
        .await
        .unwrap();

    assert_eq!(created.id, "abc123");
    assert_eq!(created.field("dailyFrequency"), Some(&json!(3)));
}

#[tokio::test]
async fn get_decodes_and_maps_missing_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/user_settings/u-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/user_settings/u-1",
            "fields": {
                "mealTimes": {"mapValue": {"fields": {"breakfast": {"stringValue": "07:30"}}}},
                "emailNotification": {"booleanValue": true}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/user_settings/u-2")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Document not found", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let settings = CollectionPath::root("user_settings");

    let found = store.get(&settings.doc("u-1")).await.unwrap().unwrap();
    assert_eq!(found.id, "u-1");
    assert_eq!(
        found.into_json(),
        json!({"id": "u-1", "mealTimes": {"breakfast": "07:30"}, "emailNotification": true})
    );
    assert!(store.get(&settings.doc("u-2")).await.unwrap().is_none());
}

#[tokio::test]
async fn update_requires_existing_document() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{DOCS}/medications/m-1")))
        .and(query_param("updateMask.fieldPaths", "medicationName"))
        .and(query_param("currentDocument.exists", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/medications/m-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{DOCS}/medications/gone")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "No document to update", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let meds = CollectionPath::root("medications");

    store
        .update(&meds.doc("m-1"), obj(json!({"medicationName": "Aspirin"})))
        .await
        .unwrap();

    let err = store
        .update(&meds.doc("gone"), obj(json!({"medicationName": "Aspirin"})))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn set_merge_masks_leaf_fields_only() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{DOCS}/user_settings/u-1")))
        .and(query_param("updateMask.fieldPaths", "mealTimes.lunch"))
        .and(query_param("updateMask.fieldPaths", "emailNotification"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/demo/databases/(default)/documents/user_settings/u-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store
        .set_merge(
            &CollectionPath::root("user_settings").doc("u-1"),
            obj(json!({"mealTimes": {"lunch": "12:30"}, "emailNotification": false})),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.as_str().contains("currentDocument"));
}

#[tokio::test]
async fn query_nested_collection_runs_under_parent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!(
            "{DOCS}/artifacts/app-1/users/u-1:runQuery"
        )))
        .and(body_partial_json(json!({
            "structuredQuery": {
                "from": [{"collectionId": "records"}],
                "orderBy": [{"field": {"fieldPath": "timestamp"}, "direction": "DESCENDING"}]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "document": {
                    "name": "projects/demo/databases/(default)/documents/artifacts/app-1/users/u-1/records/r2",
                    "fields": {"timestamp": {"stringValue": "2024-05-02T08:00:00.000Z"}}
                },
                "readTime": "2024-05-03T00:00:00Z"
            },
            {
                "document": {
                    "name": "projects/demo/databases/(default)/documents/artifacts/app-1/users/u-1/records/r1",
                    "fields": {"timestamp": {"stringValue": "2024-05-01T08:00:00.000Z"}}
                },
                "readTime": "2024-05-03T00:00:00Z"
            },
            {"readTime": "2024-05-03T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let records = CollectionPath::root("artifacts")
        .child("app-1", "users")
        .child("u-1", "records");
    let docs = store
        .query(
            &records,
            &Query::new().order_by("timestamp", Direction::Descending),
        )
        .await
        .unwrap();

    let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["r2", "r1"]);
}

#[tokio::test]
async fn delete_batch_commits_in_chunks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .and(body_string_contains(
            "projects/demo/databases/(default)/documents/records/r0",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .and(body_string_contains(format!(
            "records/r{MAX_BATCH_WRITES}\""
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": []})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let records = CollectionPath::root("records");
    let paths: Vec<_> = (0..=MAX_BATCH_WRITES)
        .map(|i| records.doc(format!("r{i}")))
        .collect();

    store.delete_batch(&paths).await.unwrap();
}

#[tokio::test]
async fn delete_batch_failure_is_a_batch_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{DOCS}:commit")))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store
        .delete_batch(&[CollectionPath::root("records").doc("r1")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        knowdose_storage::StorageError::BatchError { .. }
    ));
}

#[tokio::test]
async fn service_account_token_is_exchanged_once_and_reused() {
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{DOCS}/user_settings/u-1")))
        .and(header("authorization", "Bearer ya29.test-token"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
    let escaped = pem.as_str().replace('\n', "\\n");

    let credentials = Credentials::service_account("svc@demo.iam.gserviceaccount.com", &escaped)
        .with_token_url(format!("{}/token", server.uri()));
    let config = FirestoreConfig::emulator("demo", &server.uri()).with_credentials(credentials);
    let store = FirestoreStore::new(config).unwrap();

    let settings = CollectionPath::root("user_settings").doc("u-1");
    assert!(store.get(&settings).await.unwrap().is_none());
    assert!(store.get(&settings).await.unwrap().is_none());
}
