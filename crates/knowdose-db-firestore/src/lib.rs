//! Cloud Firestore backend for the KnowDose document store.
//!
//! Talks to the Firestore v1 REST API with `reqwest`, so no gRPC stack or
//! Google SDK is needed. Documents are converted to and from Firestore's
//! typed value encoding in [`value`].
//!
//! # Example
//!
//! ```ignore
//! use knowdose_db_firestore::{Credentials, FirestoreConfig, FirestoreStore};
//!
//! let config = FirestoreConfig::new("my-project")
//!     .with_credentials(Credentials::service_account(email, &private_key));
//! let store = FirestoreStore::new(config)?;
//! ```

pub mod auth;
pub mod config;
pub mod store;
pub mod value;

pub use auth::{Credentials, TokenProvider};
pub use config::FirestoreConfig;
pub use store::{FirestoreStore, MAX_BATCH_WRITES};

/// Creates a shareable Firestore-backed store.
///
/// # Errors
///
/// Returns an error if the configured endpoint is invalid.
pub fn create_store(
    config: FirestoreConfig,
) -> Result<knowdose_storage::DynStore, knowdose_storage::StorageError> {
    Ok(std::sync::Arc::new(FirestoreStore::new(config)?))
}
