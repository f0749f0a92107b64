mod json_file;
pub mod models;
mod supabase;

pub use json_file::JsonFileStore;
pub use supabase::SupabaseStore;

use async_trait::async_trait;
use thiserror::Error;

use models::Record;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Abstraction over the collection storage backends.
///
/// Every mutating call is write-through: when it returns `Ok` the change is durable,
/// and when it returns `Err` the change has not been applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError>;

    /// All records of a collection, in stored order.
    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    async fn find(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .find(|r| r.id == id))
    }

    /// Append a record. The caller is responsible for the id being unused.
    async fn insert(&self, collection: &str, record: Record) -> Result<(), StoreError>;

    /// Replace the record with the same id. Returns `false` if there was none.
    async fn replace(&self, collection: &str, record: Record) -> Result<bool, StoreError>;

    /// Remove a record by id, returning it if it existed.
    async fn remove(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError>;
}
