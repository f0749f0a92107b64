//! Generic CRUD over named collections.
//!
//! The adapter owns id assignment and the removal of upload files referenced by deleted
//! records. Mutations on one collection are serialized through a per-collection lock, so
//! the read-id/insert and find/mutate/write cycles never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::FileFields;
use crate::storage::models::{next_id, Record};
use crate::storage::{DocumentStore, StoreError};
use crate::uploads::UploadStore;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("Record {id} not found in {collection}")]
    NotFound { collection: String, id: u64 },
    #[error("No ids left in {0}")]
    IdsExhausted(String),
    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for ResourceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownCollection(name) => ResourceError::UnknownCollection(name),
            other => ResourceError::Storage(other),
        }
    }
}

pub struct ResourceAdapter {
    store: Arc<dyn DocumentStore>,
    uploads: Arc<dyn UploadStore>,
    file_fields: FileFields,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResourceAdapter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploads: Arc<dyn UploadStore>,
        file_fields: FileFields,
    ) -> Self {
        Self {
            store,
            uploads,
            file_fields,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn file_fields(&self) -> &FileFields {
        &self.file_fields
    }

    pub async fn list(&self, collection: &str) -> Result<Vec<Record>, ResourceError> {
        Ok(self.store.list(collection).await?)
    }

    /// Create a record with the next free id.
    ///
    /// `uploaded` maps file fields to the stored names the upload step produced. Every
    /// configured file field of the collection ends up on the record, `null` when no file
    /// was sent for it.
    pub async fn create(
        &self,
        collection: &str,
        payload: Map<String, Value>,
        uploaded: &HashMap<String, String>,
    ) -> Result<Record, ResourceError> {
        let lock = self.lock_for(collection).await?;
        let _guard = lock.lock().await;

        let existing = self.store.list(collection).await?;
        let id = next_id(&existing)
            .ok_or_else(|| ResourceError::IdsExhausted(collection.to_string()))?;
        let mut record = Record::new(id, payload);

        for field in self.file_fields.for_collection(collection) {
            let value = uploaded
                .get(field)
                .map_or(Value::Null, |name| Value::String(name.clone()));
            record.fields.insert(field.to_string(), value);
        }

        self.store.insert(collection, record.clone()).await?;

        tracing::debug!(collection, id = record.id, "Created record");
        Ok(record)
    }

    /// Shallow-merge `patch` onto an existing record. Never creates one.
    pub async fn update(
        &self,
        collection: &str,
        id: u64,
        patch: Map<String, Value>,
    ) -> Result<Record, ResourceError> {
        let lock = self.lock_for(collection).await?;
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .find(collection, id)
            .await?
            .ok_or_else(|| not_found(collection, id))?;

        record.merge(patch);

        if !self.store.replace(collection, record.clone()).await? {
            return Err(not_found(collection, id));
        }

        tracing::debug!(collection, id, "Updated record");
        Ok(record)
    }

    /// Remove a record, then remove any upload files it referenced.
    ///
    /// File removal happens after the record removal is durable and cannot fail the call.
    pub async fn delete(&self, collection: &str, id: u64) -> Result<Record, ResourceError> {
        let lock = self.lock_for(collection).await?;
        let _guard = lock.lock().await;

        let record = self
            .store
            .remove(collection, id)
            .await?
            .ok_or_else(|| not_found(collection, id))?;

        self.remove_files(collection, &record).await;

        tracing::debug!(collection, id, "Deleted record");
        Ok(record)
    }

    async fn remove_files(&self, collection: &str, record: &Record) {
        for field in self.file_fields.for_collection(collection) {
            let Some(name) = record.file_name(field) else {
                continue;
            };

            match self.uploads.delete(name).await {
                Ok(()) => tracing::debug!(collection, id = record.id, file = name, "Removed upload"),
                Err(e) => tracing::warn!(
                    collection,
                    id = record.id,
                    file = name,
                    error = %e,
                    "Failed to remove upload for deleted record"
                ),
            }
        }
    }

    /// Lock guarding mutations of one collection. Only existing collections get one.
    async fn lock_for(
        &self,
        collection: &str,
    ) -> Result<Arc<tokio::sync::Mutex<()>>, ResourceError> {
        if !self.store.has_collection(collection).await? {
            return Err(ResourceError::UnknownCollection(collection.to_string()));
        }

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(locks.entry(collection.to_string()).or_default()))
    }
}

fn not_found(collection: &str, id: u64) -> ResourceError {
    ResourceError::NotFound {
        collection: collection.to_string(),
        id,
    }
}
