//! Storage traits for the document storage abstraction layer.
//!
//! This module defines the trait that all storage backends must implement.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::types::{CollectionPath, DocumentPath, Query, StoredDocument};

/// The storage trait that all document store backends must implement.
///
/// Documents are JSON objects addressed by [`DocumentPath`]. Implementations
/// must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use knowdose_storage::{CollectionPath, DocumentStore, Query, StorageError};
///
/// async fn medications_of(store: &dyn DocumentStore, user: &str) -> Result<usize, StorageError> {
///     let query = Query::new().where_eq("userId", user);
///     Ok(store.query(&CollectionPath::root("medications"), &query).await?.len())
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Adds a document with a backend-generated id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidDocument` if the backend cannot encode the data.
    async fn add(
        &self,
        collection: &CollectionPath,
        data: Map<String, Value>,
    ) -> Result<StoredDocument, StorageError>;

    /// Reads a document.
    ///
    /// Returns `None` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing documents.
    async fn get(&self, path: &DocumentPath) -> Result<Option<StoredDocument>, StorageError>;

    /// Replaces the given top-level fields of an existing document, leaving
    /// every other field untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    async fn update(
        &self,
        path: &DocumentPath,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError>;

    /// Creates the document or deep-merges `data` into it: nested objects
    /// are merged key by key, any other value replaces the stored one.
    async fn set_merge(
        &self,
        path: &DocumentPath,
        data: Map<String, Value>,
    ) -> Result<(), StorageError>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, path: &DocumentPath) -> Result<(), StorageError>;

    /// Runs a query against a single collection.
    async fn query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> Result<Vec<StoredDocument>, StorageError>;

    /// Deletes several documents in one batch.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BatchError` if the batch could not be applied.
    async fn delete_batch(&self, paths: &[DocumentPath]) -> Result<(), StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
