use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use super::resource_error;
use crate::api::response::{ApiError, AppForm, AppJson, JSend};
use crate::storage::models::Record;
use crate::uploads::{self, UploadError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: u64,
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<Json<JSend<Vec<Record>>>, ApiError> {
    let records = state
        .resources
        .list(&collection)
        .await
        .map_err(resource_error)?;

    if records.is_empty() {
        return Err(ApiError::not_found("No records found"));
    }

    Ok(JSend::success(records))
}

/// Accepts multipart forms (text fields plus file parts), url-encoded forms, or JSON.
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    request: Request,
) -> Result<(StatusCode, Json<JSend<Record>>), ApiError> {
    let content_type = content_type_of(&request);

    // Stored upload names by field, cleaned up again if the create does not go through.
    let mut uploaded: HashMap<String, String> = HashMap::new();

    let payload = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?;

        match read_multipart(&state, &collection, multipart, &mut uploaded).await {
            Ok(payload) => payload,
            Err(e) => {
                discard_uploads(&state, &uploaded).await;
                return Err(e);
            }
        }
    } else {
        read_fields(&state, &content_type, request).await?
    };

    match state.resources.create(&collection, payload, &uploaded).await {
        Ok(record) => Ok((StatusCode::CREATED, JSend::success(record))),
        Err(e) => {
            discard_uploads(&state, &uploaded).await;
            Err(resource_error(e))
        }
    }
}

/// Accepts url-encoded forms or JSON.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    request: Request,
) -> Result<Json<JSend<Record>>, ApiError> {
    let id = parse_id(&id)?;
    let content_type = content_type_of(&request);
    let patch = read_fields(&state, &content_type, request).await?;
    let record = state
        .resources
        .update(&collection, id, patch)
        .await
        .map_err(resource_error)?;

    Ok(JSend::success(record))
}

pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<JSend<DeleteResponse>>, ApiError> {
    let id = parse_id(&id)?;
    state
        .resources
        .delete(&collection, id)
        .await
        .map_err(resource_error)?;

    Ok(JSend::success(DeleteResponse {
        id,
        message: "Record deleted".to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn content_type_of(request: &Request) -> String {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Body fields of a url-encoded form (all values as strings) or a JSON object.
async fn read_fields(
    state: &Arc<AppState>,
    content_type: &str,
    request: Request,
) -> Result<Map<String, Value>, ApiError> {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let AppForm(fields) =
            AppForm::<HashMap<String, String>>::from_request(request, state).await?;
        Ok(fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect())
    } else {
        let AppJson(fields) = AppJson::<Map<String, Value>>::from_request(request, state).await?;
        Ok(fields)
    }
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("id must be a positive integer"))
}

/// Collect text fields into the payload and store file parts for the collection's
/// configured file fields. Only the first file per field is kept; file parts for other
/// fields are skipped without being written.
async fn read_multipart(
    state: &AppState,
    collection: &str,
    mut multipart: Multipart,
    uploaded: &mut HashMap<String, String>,
) -> Result<Map<String, Value>, ApiError> {
    let mut payload = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name.is_empty() {
            continue;
        }

        let Some(original) = field.file_name().map(|s| s.to_string()) else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid {field_name}: {e}")))?;
            payload.insert(field_name, Value::String(text));
            continue;
        };

        if !state
            .resources
            .file_fields()
            .contains(collection, &field_name)
        {
            tracing::debug!(collection, field = %field_name, "Ignoring file part");
            continue;
        }
        if uploaded.contains_key(&field_name) {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

        if data.len() as u64 > state.config.uploads.max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "File exceeds maximum upload size of {} bytes",
                state.config.uploads.max_upload_size
            )));
        }

        // Browsers send an empty, unnamed part for a file input left blank.
        if data.is_empty() && original.is_empty() {
            continue;
        }

        let name = store_upload(state, &original, data).await?;

        tracing::debug!(collection, field = %field_name, file = %name, "Stored upload");
        uploaded.insert(field_name, name);
    }

    Ok(payload)
}

/// Generated names only differ by millisecond. The store refuses to overwrite, so a
/// clash with a concurrent upload waits for the next millisecond and tries again.
async fn store_upload(state: &AppState, original: &str, data: Bytes) -> Result<String, ApiError> {
    loop {
        let name = uploads::generate_name(original);
        match state.uploads.put(&name, data.clone()).await {
            Ok(()) => return Ok(name),
            Err(UploadError::AlreadyExists(_)) => {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            Err(e) => return Err(ApiError::internal(format!("Failed to store upload: {e}"))),
        }
    }
}

async fn discard_uploads(state: &AppState, uploaded: &HashMap<String, String>) {
    for name in uploaded.values() {
        if let Err(e) = state.uploads.delete(name).await {
            tracing::warn!(file = %name, error = %e, "Failed to discard upload");
        }
    }
}
