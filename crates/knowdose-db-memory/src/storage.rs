use std::sync::Arc;

use async_trait::async_trait;
use knowdose_core::generate_id;
use knowdose_storage::json::deep_merge;
use knowdose_storage::{
    CollectionPath, DocumentPath, DocumentStore, Query, StorageError, StoredDocument,
};
use papaya::HashMap as PapayaHashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::query;

/// In-memory document store using papaya lock-free HashMap.
///
/// Reads are lock-free. Every write goes through a single write lock, so an
/// `update` can never re-insert a document that a concurrent `delete`
/// already removed, and a merge never loses a concurrent change.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Arc<PapayaHashMap<DocumentPath, Map<String, Value>>>,
    writes: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collection_docs(&self, collection: &CollectionPath) -> Vec<StoredDocument> {
        let guard = self.data.pin();
        guard
            .iter()
            .filter(|(path, _)| &path.collection == collection)
            .map(|(path, data)| StoredDocument::new(path.id.clone(), data.clone()))
            .collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn add(
        &self,
        collection: &CollectionPath,
        data: Map<String, Value>,
    ) -> Result<StoredDocument, StorageError> {
        let id = generate_id();
        let _write = self.writes.lock().await;
        self.data.pin().insert(collection.doc(&id), data.clone());
        Ok(StoredDocument::new(id, data))
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StorageError> {
        let guard = self.data.pin();
        Ok(guard
            .get(path)
            .map(|data| StoredDocument::new(path.id.clone(), data.clone())))
    }

    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.data.pin();
        let mut current = guard
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path.to_string()))?;
        current.extend(fields);
        guard.insert(path.clone(), current);
        Ok(())
    }

    async fn set_merge(
        &self,
        path: &DocumentPath,
        data: Map<String, Value>,
    ) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.data.pin();
        let mut current = guard.get(path).cloned().unwrap_or_default();
        deep_merge(&mut current, data);
        guard.insert(path.clone(), current);
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        self.data.pin().remove(path);
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StorageError> {
        Ok(query::execute(self.collection_docs(collection), query))
    }

    async fn delete_batch(&self, paths: &[DocumentPath]) -> Result<(), StorageError> {
        let _write = self.writes.lock().await;
        let guard = self.data.pin();
        for path in paths {
            guard.remove(path);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
