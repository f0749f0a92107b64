//! Shared test helpers for resource-gateway tests.

use std::sync::Arc;

use crate::config::{Config, FileFields, ServerConfig, StorageConfig, UploadConfig};
use crate::resources::ResourceAdapter;
use crate::storage::JsonFileStore;
use crate::uploads::LocalUploadStore;
use crate::AppState;

/// Collections present in every test document.
pub const TEST_DOCUMENT: &str =
    r#"{"downloads": [], "aplicativos": [], "publicidadesdb": [], "users": []}"#;

/// Create a test AppState backed by a temporary JSON document and upload directory.
pub async fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let db_file = temp_dir.path().join("db.json");
    let upload_dir = temp_dir.path().join("arquivos");
    std::fs::write(&db_file, TEST_DOCUMENT).expect("Failed to write test document");

    let config = Config {
        file_fields: FileFields::parse(crate::config::DEFAULT_FILE_FIELDS)
            .expect("Failed to parse file fields"),
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
        },
        storage: StorageConfig {
            db_file: db_file.to_string_lossy().to_string(),
            ..Default::default()
        },
        uploads: UploadConfig {
            dir: upload_dir.to_string_lossy().to_string(),
            max_upload_size: 1024 * 1024, // 1MB for tests
        },
    };

    let store = JsonFileStore::open(&db_file)
        .await
        .expect("Failed to open test document");
    let uploads: Arc<LocalUploadStore> =
        Arc::new(LocalUploadStore::new(&upload_dir).expect("Failed to create upload dir"));

    Arc::new(AppState {
        resources: ResourceAdapter::new(
            Arc::new(store),
            uploads.clone(),
            config.file_fields.clone(),
        ),
        uploads,
        config,
    })
}
