use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use super::models::Record;
use super::{DocumentStore, StoreError};

/// Hosted relational backend reached through Supabase's PostgREST API.
///
/// Each collection maps to a table of the same name. Ids are still assigned by the
/// caller, so tables need a plain integer `id` column rather than an identity column.
pub struct SupabaseStore {
    base_url: String,
    client: Client,
    key: String,
}

impl SupabaseStore {
    pub fn new(url: &str, key: &str) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
            key: key.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> Result<String, StoreError> {
        if !is_valid_table_name(table) {
            return Err(StoreError::UnknownCollection(table.to_string()));
        }
        Ok(format!("{}/rest/v1/{table}", self.base_url))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(&self, table: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        let resp = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // PostgREST answers 404 for relations it does not know about.
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::UnknownCollection(table.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "Supabase request on '{table}' failed ({status}): {body}"
            )));
        }

        Ok(resp)
    }

    async fn records(&self, table: &str, resp: Response) -> Result<Vec<Record>, StoreError> {
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    StoreError::InvalidDocument(format!("table '{table}' returned a bad row: {e}"))
                })
            })
            .collect()
    }
}

/// PostgREST table names are path segments; only plain identifiers are accepted.
fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl DocumentStore for SupabaseStore {
    async fn has_collection(&self, collection: &str) -> Result<bool, StoreError> {
        let url = self.table_url(collection)?;
        let request = self.client.get(url).query(&[("select", "id"), ("limit", "1")]);
        match self.send(collection, request).await {
            Ok(_) => Ok(true),
            Err(StoreError::UnknownCollection(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let url = self.table_url(collection)?;
        let request = self.client.get(url).query(&[("select", "*")]);
        let resp = self.send(collection, request).await?;
        self.records(collection, resp).await
    }

    async fn find(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        let url = self.table_url(collection)?;
        let request = self
            .client
            .get(url)
            .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]);
        let resp = self.send(collection, request).await?;
        Ok(self.records(collection, resp).await?.into_iter().next())
    }

    async fn insert(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        let url = self.table_url(collection)?;
        let request = self
            .client
            .post(url)
            .header("Prefer", "return=minimal")
            .json(&[record]);
        self.send(collection, request).await?;
        Ok(())
    }

    async fn replace(&self, collection: &str, record: Record) -> Result<bool, StoreError> {
        let url = self.table_url(collection)?;
        let request = self
            .client
            .patch(url)
            .query(&[("id", format!("eq.{}", record.id))])
            .header("Prefer", "return=representation")
            .json(&record);
        let resp = self.send(collection, request).await?;
        Ok(!self.records(collection, resp).await?.is_empty())
    }

    async fn remove(&self, collection: &str, id: u64) -> Result<Option<Record>, StoreError> {
        let url = self.table_url(collection)?;
        let request = self
            .client
            .delete(url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let resp = self.send(collection, request).await?;
        Ok(self.records(collection, resp).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url() {
        let store = SupabaseStore::new("https://example.supabase.co/", "key").unwrap();
        assert_eq!(
            store.table_url("aplicativos").unwrap(),
            "https://example.supabase.co/rest/v1/aplicativos"
        );
    }

    #[test]
    fn test_table_url_rejects_odd_names() {
        let store = SupabaseStore::new("https://example.supabase.co", "key").unwrap();
        for name in ["", "users?select=*", "../secrets", "a b"] {
            assert!(matches!(
                store.table_url(name),
                Err(StoreError::UnknownCollection(_))
            ));
        }
    }
}
