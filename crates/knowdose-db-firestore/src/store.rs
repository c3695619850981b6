use async_trait::async_trait;
use knowdose_storage::{
    CollectionPath, Direction, DocumentPath, DocumentStore, FieldFilter, Query, StorageError,
    StoredDocument,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::config::FirestoreConfig;
use crate::value::{decode_fields, encode_fields, encode_value, leaf_paths, quote_field};

/// Maximum number of writes Firestore accepts in one commit.
pub const MAX_BATCH_WRITES: usize = 500;

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDocument {
    fn into_stored(self) -> Result<StoredDocument, StorageError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(StoredDocument::new(id, decode_fields(&self.fields)?))
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Document store backed by the Cloud Firestore REST API.
pub struct FirestoreStore {
    http: reqwest::Client,
    config: FirestoreConfig,
    endpoint: Url,
    tokens: TokenProvider,
}

impl FirestoreStore {
    /// Creates a store for the configured project.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionError` if the endpoint is not a valid
    /// base URL or the HTTP client cannot be built.
    pub fn new(config: FirestoreConfig) -> Result<Self, StorageError> {
        let endpoint = Url::parse(&config.endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                StorageError::connection_error(format!(
                    "invalid Firestore endpoint '{}'",
                    config.endpoint
                ))
            })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::connection_error(format!("HTTP client: {e}")))?;
        let tokens = TokenProvider::new(http.clone(), config.credentials.clone());

        Ok(Self {
            http,
            config,
            endpoint,
            tokens,
        })
    }

    #[must_use]
    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// `{endpoint}/v1/projects/{p}/databases/{db}/documents/{segments...}`.
    ///
    /// `suffix` is appended to the last segment, for custom methods such as
    /// `:runQuery`.
    fn documents_url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
        suffix: &str,
    ) -> Result<Url, StorageError> {
        let mut parts: Vec<String> = vec![
            "v1".into(),
            "projects".into(),
            self.config.project_id.clone(),
            "databases".into(),
            self.config.database_id.clone(),
            "documents".into(),
        ];
        parts.extend(segments.into_iter().map(str::to_string));
        if let Some(last) = parts.last_mut() {
            last.push_str(suffix);
        }

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::internal("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(parts.iter());
        Ok(url)
    }

    fn document_url(&self, path: &DocumentPath) -> Result<Url, StorageError> {
        check_segments(path)?;
        let segments = path
            .collection
            .segments()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(path.id.as_str()));
        self.documents_url(segments, "")
    }

    /// Full resource name, as used inside request bodies.
    fn document_name(&self, path: &DocumentPath) -> Result<String, StorageError> {
        check_segments(path)?;
        Ok(format!("{}/{}", self.config.documents_name(), path))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        let request = match self.tokens.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request.send().await.map_err(|e| {
            warn!(error = %e, "Firestore request failed");
            StorageError::connection_error(e.to_string())
        })
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Response, StorageError> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.send(request).await
    }

    async fn error_from(response: Response, context: &str) -> StorageError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GoogleErrorBody>(&body)
            .map(|b| format!("{} {}", b.error.status, b.error.message))
            .unwrap_or(body);
        warn!(status = status.as_u16(), detail = %detail, "Firestore returned an error");

        match status {
            StatusCode::NOT_FOUND => StorageError::not_found(context),
            StatusCode::BAD_REQUEST => {
                StorageError::invalid_document(format!("{context}: {}", detail.trim()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StorageError::connection_error(format!("{status}: {}", detail.trim()))
            }
            _ => StorageError::internal(format!("{context}: {status} {}", detail.trim())),
        }
    }

    async fn parse_document(response: Response) -> Result<FirestoreDocument, StorageError> {
        response
            .json::<FirestoreDocument>()
            .await
            .map_err(|e| StorageError::internal(format!("invalid Firestore document: {e}")))
    }

    /// PATCH with an explicit update mask. `must_exist` adds the
    /// `currentDocument.exists` precondition.
    async fn patch(
        &self,
        path: &DocumentPath,
        data: &Map<String, Value>,
        mask: &[String],
        must_exist: bool,
    ) -> Result<(), StorageError> {
        let mut url = self.document_url(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for field in mask {
                pairs.append_pair("updateMask.fieldPaths", field);
            }
            if must_exist {
                pairs.append_pair("currentDocument.exists", "true");
            }
        }

        let body = json!({ "fields": encode_fields(data) });
        let response = self.request(Method::PATCH, url, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, &path.to_string()).await);
        }
        Ok(())
    }
}

fn field_filter(filter: &FieldFilter) -> Value {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": quote_field(&filter.field) },
            "op": "EQUAL",
            "value": encode_value(&filter.value),
        }
    })
}

/// Ids and collection names are single path segments; a `/` inside one
/// would address a different document in URLs than in resource names.
fn check_segments(path: &DocumentPath) -> Result<(), StorageError> {
    let valid = path
        .collection
        .segments()
        .iter()
        .chain(std::iter::once(&path.id))
        .all(|segment| !segment.is_empty() && !segment.contains('/'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::invalid_path(path.to_string()))
    }
}

/// Builds the `structuredQuery` body of a `runQuery` call.
pub(crate) fn structured_query(collection: &CollectionPath, query: &Query) -> Value {
    let mut structured = Map::new();
    structured.insert(
        "from".into(),
        json!([{ "collectionId": collection.collection_id() }]),
    );

    match query.filters.as_slice() {
        [] => {}
        [single] => {
            structured.insert("where".into(), field_filter(single));
        }
        many => {
            let filters: Vec<Value> = many.iter().map(field_filter).collect();
            structured.insert(
                "where".into(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": quote_field(&order.field) }, "direction": direction }]),
        );
    }

    json!({ "structuredQuery": structured })
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip(self, data))]
    async fn add(
        &self,
        collection: &CollectionPath,
        data: Map<String, Value>,
    ) -> Result<StoredDocument, StorageError> {
        let url = self.documents_url(collection.segments().iter().map(String::as_str), "")?;
        let body = json!({ "fields": encode_fields(&data) });
        let response = self.request(Method::POST, url, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, &collection.to_string()).await);
        }

        let created = Self::parse_document(response).await?;
        let id = created.into_stored()?.id;
        debug!(id = %id, "Created document");
        Ok(StoredDocument::new(id, data))
    }

    #[instrument(skip(self))]
    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StorageError> {
        let url = self.document_url(path)?;
        let response = self.request(Method::GET, url, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Self::parse_document(response).await?.into_stored().map(Some),
            _ => Err(Self::error_from(response, &path.to_string()).await),
        }
    }

    #[instrument(skip(self, fields))]
    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError> {
        if fields.is_empty() {
            // An empty mask would overwrite the whole document.
            return match self.get(path).await? {
                Some(_) => Ok(()),
                None => Err(StorageError::not_found(path.to_string())),
            };
        }
        let mask: Vec<String> = fields.keys().map(|k| quote_field(k)).collect();
        self.patch(path, &fields, &mask, true).await
    }

    #[instrument(skip(self, data))]
    async fn set_merge(
        &self,
        path: &DocumentPath,
        data: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mask = leaf_paths(&data);
        if mask.is_empty() {
            return Ok(());
        }
        self.patch(path, &data, &mask, false).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &DocumentPath) -> Result<(), StorageError> {
        let url = self.document_url(path)?;
        let response = self.request(Method::DELETE, url, None).await?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::error_from(response, &path.to_string()).await),
        }
    }

    #[instrument(skip(self, query))]
    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        let segments = collection.segments();
        let parent = &segments[..segments.len().saturating_sub(1)];
        let url = self.documents_url(parent.iter().map(String::as_str), ":runQuery")?;

        let body = structured_query(collection, query);
        let response = self.request(Method::POST, url, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response, &collection.to_string()).await);
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| StorageError::internal(format!("invalid runQuery response: {e}")))?;
        let docs = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(FirestoreDocument::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = docs.len(), "Query returned documents");
        Ok(docs)
    }

    #[instrument(skip(self, paths), fields(count = paths.len()))]
    async fn delete_batch(&self, paths: &[DocumentPath]) -> Result<(), StorageError> {
        let url = self.documents_url(std::iter::empty(), ":commit")?;
        for chunk in paths.chunks(MAX_BATCH_WRITES) {
            let writes = chunk
                .iter()
                .map(|p| Ok(json!({ "delete": self.document_name(p)? })))
                .collect::<Result<Vec<Value>, StorageError>>()?;
            let response = self
                .request(Method::POST, url.clone(), Some(json!({ "writes": writes })))
                .await?;
            if !response.status().is_success() {
                let cause = Self::error_from(response, "commit").await;
                return Err(StorageError::batch_error(cause.to_string()));
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FirestoreStore {
        FirestoreStore::new(FirestoreConfig::emulator("demo", "localhost:8080")).unwrap()
    }

    #[test]
    fn builds_document_urls() {
        let store = store();
        let path = CollectionPath::root("artifacts")
            .child("app-1", "users")
            .child("u 1", "medications")
            .doc("m1");
        assert_eq!(
            store.document_url(&path).unwrap().as_str(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents/artifacts/app-1/users/u%201/medications/m1"
        );

        let run = store.documents_url(std::iter::empty(), ":runQuery").unwrap();
        assert!(run.as_str().ends_with("/databases/(default)/documents:runQuery"));
    }

    #[test]
    fn rejects_segments_containing_slashes() {
        let store = store();
        let path = CollectionPath::root("artifacts")
            .child("app-1", "users")
            .child("a/b", "medications")
            .doc("m1");
        assert!(matches!(
            store.document_url(&path),
            Err(StorageError::InvalidPath { .. })
        ));
        assert!(matches!(
            store.document_name(&path),
            Err(StorageError::InvalidPath { .. })
        ));

        let ok = CollectionPath::root("records").doc("r1");
        assert_eq!(
            store.document_name(&ok).unwrap(),
            "projects/demo/databases/(default)/documents/records/r1"
        );
    }

    #[test]
    fn structured_query_uses_composite_filter_for_many() {
        let records = CollectionPath::root("records");
        let query = Query::new()
            .where_eq("userId", "u-1")
            .where_eq("medicationId", "m-1")
            .order_by("timestamp", Direction::Descending);

        let body = structured_query(&records, &query);
        let sq = &body["structuredQuery"];
        assert_eq!(sq["from"], json!([{"collectionId": "records"}]));
        assert_eq!(sq["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            sq["where"]["compositeFilter"]["filters"][1]["fieldFilter"]["value"],
            json!({"stringValue": "m-1"})
        );
        assert_eq!(sq["orderBy"][0]["direction"], "DESCENDING");
    }

    #[test]
    fn structured_query_single_filter_is_plain() {
        let query = Query::new().where_eq("userId", "u-1");
        let body = structured_query(&CollectionPath::root("medications"), &query);
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"]["field"]["fieldPath"],
            "userId"
        );
        assert!(body["structuredQuery"].get("orderBy").is_none());
    }

    #[test]
    fn rejects_opaque_endpoints() {
        let config = FirestoreConfig::new("demo").with_endpoint("mailto:nobody");
        assert!(FirestoreStore::new(config).is_err());
    }
}
