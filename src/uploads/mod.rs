mod local;

pub use local::LocalUploadStore;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload not found: {0}")]
    NotFound(String),
    #[error("Invalid upload name: {0}")]
    InvalidName(String),
    #[error("Upload already exists: {0}")]
    AlreadyExists(String),
}

/// Abstraction over where uploaded attachments are kept.
/// Names are the generated `<epoch-millis>_<original-name>` strings stored on records.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Store a new upload. Never overwrites: an existing name yields `AlreadyExists`.
    async fn put(&self, name: &str, data: Bytes) -> Result<(), UploadError>;
    async fn get(&self, name: &str) -> Result<Bytes, UploadError>;
    /// Removing a name that does not exist is not an error.
    async fn delete(&self, name: &str) -> Result<(), UploadError>;
    async fn exists(&self, name: &str) -> Result<bool, UploadError>;
}

/// Generate a collision-resistant stored name for an uploaded file.
pub fn generate_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("upload");

    format!("{}_{base}", Utc::now().timestamp_millis())
}

/// Names must be a single path component.
pub(crate) fn validate_name(name: &str) -> Result<(), UploadError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(UploadError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_name_prefixes_timestamp() {
        let before = Utc::now().timestamp_millis();
        let name = generate_name("app.apk");
        let after = Utc::now().timestamp_millis();

        let (millis, rest) = name.split_once('_').unwrap();
        let millis: i64 = millis.parse().unwrap();
        assert!(millis >= before && millis <= after);
        assert_eq!(rest, "app.apk");
    }

    #[test]
    fn test_generate_name_strips_directories() {
        assert!(generate_name("../../etc/passwd").ends_with("_passwd"));
        assert!(generate_name("C:\\Users\\me\\photo.png").ends_with("_photo.png"));
        assert!(generate_name("").ends_with("_upload"));
        assert!(generate_name("dir/").ends_with("_upload"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("123_app.apk").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
    }
}
