use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{validate_name, UploadError, UploadStore};

/// Upload directory on the local filesystem.
pub struct LocalUploadStore {
    base_path: PathBuf,
}

impl LocalUploadStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn upload_path(&self, name: &str) -> Result<PathBuf, UploadError> {
        validate_name(name)?;
        Ok(self.base_path.join(name))
    }
}

#[async_trait]
impl UploadStore for LocalUploadStore {
    async fn put(&self, name: &str, data: Bytes) -> Result<(), UploadError> {
        let path = self.upload_path(name)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => UploadError::AlreadyExists(name.to_string()),
                _ => e.into(),
            })?;

        let written = async {
            file.write_all(&data).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Do not leave a truncated file claiming the name
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Bytes, UploadError> {
        let path = self.upload_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(UploadError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), UploadError> {
        let path = self.upload_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, UploadError> {
        let path = self.upload_path(name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
