mod admin;
mod resources;
mod uploads;

use crate::api::response::ApiError;
use crate::resources::ResourceError;

pub use admin::health;
pub use resources::{create_record, delete_record, list_records, update_record};
pub use uploads::serve_upload;

/// Map a ResourceError to an ApiError
fn resource_error(e: ResourceError) -> ApiError {
    match e {
        ResourceError::UnknownCollection(_) => ApiError::bad_request(e.to_string()),
        ResourceError::NotFound { .. } => ApiError::not_found(e.to_string()),
        ResourceError::IdsExhausted(_) | ResourceError::Storage(_) => {
            tracing::error!(error = %e, "Storage failure");
            ApiError::internal(e.to_string())
        }
    }
}
