//! resource-gateway - A REST gateway for CRUD over named JSON resource collections
//!
//! This crate provides:
//! - A generic resource adapter (id assignment, shallow-merge updates, upload cleanup on delete)
//! - Swappable document stores (flat-file JSON document, Supabase)
//! - Multipart upload handling with timestamped file names
//! - REST API with JSend responses

pub mod api;
pub mod config;
pub mod resources;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod uploads;

use std::sync::Arc;

use config::Config;
use resources::ResourceAdapter;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub resources: ResourceAdapter,
    pub uploads: Arc<dyn uploads::UploadStore>,
}
