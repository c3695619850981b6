//! Tenant-scoped access to medications, dose records and settings.
//!
//! The repository hides the storage layout: in the flat layout documents
//! live in shared collections and carry a `userId` field; in the nested
//! layout every user owns sub-collections under
//! `artifacts/{app_id}/users/{uid}`.

use knowdose_core::{
    LOCAL_ONLY_RECORD_ID, MedicationPayload, RecordPayload, SettingsPayload, fields, now_utc,
    validate_id,
};
use knowdose_storage::json::strip_nulls;
use knowdose_storage::{
    CollectionPath, Direction, DocumentPath, DynStore, Query, StorageError, StoredDocument,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::config::StorageLayout;
use crate::error::ApiError;

const MEDICATIONS: &str = "medications";
const RECORDS: &str = "records";
const USER_SETTINGS: &str = "user_settings";

#[derive(Clone)]
pub struct Repository {
    store: DynStore,
    layout: StorageLayout,
    app_id: String,
    persist_records: bool,
}

impl Repository {
    pub fn new(
        store: DynStore,
        layout: StorageLayout,
        app_id: impl Into<String>,
        persist_records: bool,
    ) -> Self {
        Self {
            store,
            layout,
            app_id: app_id.into(),
            persist_records,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    fn collection(&self, uid: &str, name: &str) -> CollectionPath {
        match self.layout {
            StorageLayout::Flat => CollectionPath::root(name),
            StorageLayout::Nested => CollectionPath::root("artifacts")
                .child(&self.app_id, "users")
                .child(uid, name),
        }
    }

    pub fn medications_path(&self, uid: &str) -> CollectionPath {
        self.collection(uid, MEDICATIONS)
    }

    pub fn records_path(&self, uid: &str) -> CollectionPath {
        self.collection(uid, RECORDS)
    }

    pub fn settings_path(&self, uid: &str) -> DocumentPath {
        match self.layout {
            StorageLayout::Flat => CollectionPath::root(USER_SETTINGS).doc(uid),
            StorageLayout::Nested => self.collection(uid, "settings").doc("preferences"),
        }
    }

    /// Base query for the tenant's documents in a collection.
    fn tenant_query(&self, uid: &str) -> Query {
        match self.layout {
            StorageLayout::Flat => Query::new().where_eq(fields::USER_ID, uid),
            StorageLayout::Nested => Query::new(),
        }
    }

    /// In the flat layout, whether a stored medication belongs to `uid`.
    fn owned_by(doc: &StoredDocument, uid: &str) -> bool {
        doc.field(fields::USER_ID).and_then(Value::as_str) == Some(uid)
    }

    #[instrument(skip(self))]
    pub async fn list_medications(&self, uid: &str) -> Result<Vec<Value>, ApiError> {
        let docs = self
            .store
            .query(&self.medications_path(uid), &self.tenant_query(uid))
            .await?;
        Ok(docs.into_iter().map(StoredDocument::into_json).collect())
    }

    #[instrument(skip(self, payload))]
    pub async fn create_medication(
        &self,
        uid: &str,
        payload: MedicationPayload,
    ) -> Result<String, ApiError> {
        let doc = strip_nulls(payload.into_new_document(uid, now_utc())?);
        let created = self.store.add(&self.medications_path(uid), doc).await?;
        info!(medication_id = %created.id, "Medication created");
        Ok(created.id)
    }

    /// Merges the given fields into an existing medication.
    #[instrument(skip(self, payload))]
    pub async fn update_medication(
        &self,
        uid: &str,
        id: &str,
        payload: MedicationPayload,
    ) -> Result<(), ApiError> {
        validate_id(id)?;
        let path = self.medications_path(uid).doc(id);

        if self.layout == StorageLayout::Flat {
            match self.store.get(&path).await? {
                Some(doc) if Self::owned_by(&doc, uid) => {}
                _ => return Err(StorageError::not_found(path.to_string()).into()),
            }
        }

        let fields = strip_nulls(payload.into_update_fields(uid)?);
        self.store.update(&path, fields).await?;
        Ok(())
    }

    /// Deletes a medication, then every record referencing it.
    ///
    /// The two steps are not atomic. If the record cleanup fails the
    /// medication is already gone; repeating the delete finishes the cleanup.
    #[instrument(skip(self))]
    pub async fn delete_medication(&self, uid: &str, id: &str) -> Result<(), ApiError> {
        validate_id(id)?;
        let path = self.medications_path(uid).doc(id);

        if self.layout == StorageLayout::Flat
            && let Some(doc) = self.store.get(&path).await?
            && !Self::owned_by(&doc, uid)
        {
            warn!(medication_id = %id, "Refusing to delete another tenant's medication");
            return Ok(());
        }

        self.store.delete(&path).await?;

        let records = self.records_path(uid);
        let query = self.tenant_query(uid).where_eq(fields::MEDICATION_ID, id);
        let cascade = async {
            let orphans = self.store.query(&records, &query).await?;
            let paths: Vec<DocumentPath> = orphans.iter().map(|d| records.doc(&d.id)).collect();
            if !paths.is_empty() {
                self.store.delete_batch(&paths).await?;
            }
            Ok::<usize, StorageError>(paths.len())
        };

        match cascade.await {
            Ok(count) => {
                info!(medication_id = %id, records_deleted = count, "Medication deleted");
                Ok(())
            }
            Err(e) => {
                warn!(medication_id = %id, error = %e, "Medication deleted but its records were not");
                Err(e.into())
            }
        }
    }

    /// Dose records of the tenant, newest first, optionally for one medication.
    #[instrument(skip(self))]
    pub async fn list_records(
        &self,
        uid: &str,
        medication_id: Option<&str>,
    ) -> Result<Vec<Value>, ApiError> {
        let mut query = self.tenant_query(uid);
        if let Some(id) = medication_id {
            validate_id(id)?;
            query = query.where_eq(fields::MEDICATION_ID, id);
        }
        let query = query.order_by(fields::TIMESTAMP, Direction::Descending);
        let docs = self.store.query(&self.records_path(uid), &query).await?;
        Ok(docs.into_iter().map(StoredDocument::into_json).collect())
    }

    /// Stores a dose record, or acknowledges it without writing when
    /// persistence is disabled.
    #[instrument(skip(self, payload))]
    pub async fn create_record(
        &self,
        uid: &str,
        medication_id: &str,
        payload: RecordPayload,
    ) -> Result<String, ApiError> {
        validate_id(medication_id)?;
        let doc = strip_nulls(payload.into_document(uid, medication_id, now_utc())?);
        if !self.persist_records {
            return Ok(LOCAL_ONLY_RECORD_ID.to_string());
        }
        let created = self.store.add(&self.records_path(uid), doc).await?;
        Ok(created.id)
    }

    /// The stored settings, or an empty object.
    #[instrument(skip(self))]
    pub async fn get_settings(&self, uid: &str) -> Result<Value, ApiError> {
        let doc = self.store.get(&self.settings_path(uid)).await?;
        Ok(Value::Object(doc.map(|d| d.data).unwrap_or_else(Map::new)))
    }

    #[instrument(skip(self, payload))]
    pub async fn save_settings(&self, uid: &str, payload: SettingsPayload) -> Result<(), ApiError> {
        let doc = strip_nulls(payload.into_document()?);
        self.store.set_merge(&self.settings_path(uid), doc).await?;
        Ok(())
    }
}
