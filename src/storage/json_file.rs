use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, sync::RwLock};

use super::models::Record;
use super::{DocumentStore, StoreError};

type Collections = BTreeMap<String, Vec<Record>>;

/// Flat-file document store: every collection lives in one JSON document shaped like
/// `{"users": [{"id": 1, ...}], "downloads": []}`.
///
/// The whole document is held in memory and rewritten on each mutation. Collections are
/// the document's top-level keys; they are never created implicitly.
pub struct JsonFileStore {
    path: PathBuf,
    collections: RwLock<Collections>,
}

impl JsonFileStore {
    /// Load an existing document. A missing file is an error, not an empty store.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).await?;
        let collections = parse_document(&bytes)?;

        tracing::debug!(
            path = %path.display(),
            collections = collections.len(),
            "Loaded JSON document"
        );

        Ok(Self {
            path,
            collections: RwLock::new(collections),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply a mutation to a copy of the document, write it out, then swap it in.
    /// The write lock is held for the whole cycle so saves never interleave.
    async fn commit<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Collections) -> Result<T, StoreError>,
    {
        let mut collections = self.collections.write().await;
        let mut next = collections.clone();
        let out = f(&mut next)?;

        let data = serde_json::to_vec_pretty(&next)?;
        fs::write(&self.path, data).await?;

        *collections = next;
        Ok(out)
    }
}

fn parse_document(bytes: &[u8]) -> Result<Collections, StoreError> {
    let document: serde_json::Map<String, Value> = serde_json::from_slice(bytes)?;
    let mut collections = Collections::new();

    for (name, value) in document {
        if !value.is_array() {
            return Err(StoreError::InvalidDocument(format!(
                "top-level key '{name}' is not an array"
            )));
        }
        let records: Vec<Record> = serde_json::from_value(value).map_err(|e| {
            StoreError::InvalidDocument(format!("collection '{name}' has an invalid record: {e}"))
        })?;
        collections.insert(name, records);
    }

    Ok(collections)
}

fn collection_mut<'a>(
    collections: &'a mut Collections,
    name: &str,
) -> Result<&'a mut Vec<Record>, StoreError> {
    collections
        .get_mut(name)
        .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }

    async fn find(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        let collections = self.collections.read().await;
        let records = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        self.commit(|collections| {
            collection_mut(collections, collection)?.push(record);
            Ok(())
        })
        .await
    }

    async fn replace(&self, collection: &str, record: Record) -> Result<bool, StoreError> {
        // Skip the rewrite entirely when there is nothing to replace.
        if self.find(collection, record.id).await?.is_none() {
            return Ok(false);
        }

        self.commit(|collections| {
            let records = collection_mut(collections, collection)?;
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => {
                    *existing = record;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn remove(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        if self.find(collection, id).await?.is_none() {
            return Ok(None);
        }

        self.commit(|collections| {
            let records = collection_mut(collections, collection)?;
            Ok(records
                .iter()
                .position(|r| r.id == id)
                .map(|index| records.remove(index)))
        })
        .await
    }
}
