//! In-memory document store for the KnowDose backend.
//!
//! This crate provides an in-memory implementation of the `DocumentStore`
//! trait from `knowdose-storage`, using papaya lock-free HashMap for
//! concurrent access. It backs local development and the test suites.
//!
//! # Example
//!
//! ```ignore
//! use knowdose_db_memory::InMemoryStore;
//! use knowdose_storage::{CollectionPath, DocumentStore};
//!
//! let store = InMemoryStore::new();
//! let doc = serde_json::json!({"userId": "u-1", "medicationName": "Aspirin"});
//! let created = store
//!     .add(&CollectionPath::root("medications"), doc.as_object().cloned().unwrap())
//!     .await?;
//! ```

pub mod query;
pub mod storage;

pub use knowdose_storage::{DocumentStore, StorageError, StoredDocument};
pub use storage::InMemoryStore;

/// Creates a new shareable in-memory store.
pub fn create_store() -> knowdose_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
