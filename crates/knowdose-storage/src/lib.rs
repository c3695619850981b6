//! # knowdose-storage
//!
//! Storage abstraction layer for the KnowDose backend.
//!
//! This crate defines the trait and types that all document store backends
//! must implement. It does not contain any implementations - those are
//! provided by separate crates (`knowdose-db-memory`, `knowdose-db-firestore`).
//!
//! ## Overview
//!
//! The main trait is [`DocumentStore`], which defines the contract for:
//! - adding, reading and deleting documents
//! - shallow updates of existing documents and deep-merging upserts
//! - equality queries with an optional sort
//! - batched deletes
//!
//! ## Example
//!
//! ```ignore
//! use knowdose_storage::{CollectionPath, Direction, DocumentStore, Query};
//!
//! let records = CollectionPath::root("records");
//! let query = Query::new()
//!     .where_eq("userId", "u-1")
//!     .order_by("timestamp", Direction::Descending);
//! let latest = store.query(&records, &query).await?;
//! ```

mod error;
pub mod json;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::DocumentStore;
pub use types::{
    CollectionPath, Direction, DocumentPath, FieldFilter, OrderBy, Query, StoredDocument,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable storage trait object.
pub type DynStore = std::sync::Arc<dyn DocumentStore>;
