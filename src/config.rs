use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub file_fields: FileFields,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Json,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON document holding every collection (json backend)
    pub db_file: String,
    /// Project URL (required when backend is supabase)
    pub supabase_url: Option<String>,
    /// Service or anon key (required when backend is supabase)
    pub supabase_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

/// Which fields of which collections carry upload filenames.
///
/// Create fills these from the request's file parts (or `null`), delete removes the
/// referenced files. Collections not listed carry no file fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileFields(BTreeMap<String, BTreeSet<String>>);

pub const DEFAULT_FILE_FIELDS: &str = "aplicativos=arquivo,filename;publicidadesdb=filename";

impl FileFields {
    /// Parse `collection=field,field;collection=field`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut table = BTreeMap::new();

        for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (collection, fields) = entry.split_once('=').ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "FILE_FIELDS entry '{entry}' must look like collection=field,field"
                ))
            })?;

            let collection = collection.trim();
            if collection.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "FILE_FIELDS entry '{entry}' has no collection name"
                )));
            }

            let fields: BTreeSet<String> = fields
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();

            if fields.contains(crate::storage::models::ID_FIELD) {
                return Err(ConfigError::ValidationError(format!(
                    "FILE_FIELDS for '{collection}' cannot include 'id'"
                )));
            }

            table
                .entry(collection.to_string())
                .or_insert_with(BTreeSet::new)
                .extend(fields);
        }

        Ok(Self(table))
    }

    pub fn for_collection(&self, collection: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(collection)
            .into_iter()
            .flat_map(|fields| fields.iter().map(String::as_str))
    }

    pub fn contains(&self, collection: &str, field: &str) -> bool {
        self.0
            .get(collection)
            .is_some_and(|fields| fields.contains(field))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            db_file: "./db.json".to_string(),
            supabase_url: None,
            supabase_key: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "./public/arquivos".to_string(),
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| {
            let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            format!("0.0.0.0:{port}")
        });

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "supabase" => StorageBackend::Supabase,
            _ => StorageBackend::Json,
        };

        let db_file = std::env::var("DB_FILE").unwrap_or_else(|_| "./db.json".to_string());
        let supabase_url = std::env::var("SUPABASE_URL").ok();
        let supabase_key = std::env::var("SUPABASE_KEY").ok();

        let upload_dir =
            std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./public/arquivos".to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let file_fields = FileFields::parse(
            &std::env::var("FILE_FIELDS").unwrap_or_else(|_| DEFAULT_FILE_FIELDS.to_string()),
        )?;

        let config = Config {
            file_fields,
            server: ServerConfig { bind_address },
            storage: StorageConfig {
                backend,
                db_file,
                supabase_url,
                supabase_key,
            },
            uploads: UploadConfig {
                dir: upload_dir,
                max_upload_size,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.storage.backend {
            StorageBackend::Json => {
                if !Path::new(&self.storage.db_file).is_file() {
                    return Err(ConfigError::ValidationError(format!(
                        "DB_FILE '{}' does not exist",
                        self.storage.db_file
                    )));
                }
            }
            StorageBackend::Supabase => {
                if self.storage.supabase_url.is_none() || self.storage.supabase_key.is_none() {
                    return Err(ConfigError::ValidationError(
                        "SUPABASE_URL and SUPABASE_KEY are required when STORAGE_BACKEND=supabase"
                            .to_string(),
                    ));
                }
            }
        }

        if self.uploads.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
