use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resource_gateway::{
    api,
    config::{Config, StorageBackend},
    resources::ResourceAdapter,
    storage::{DocumentStore, JsonFileStore, SupabaseStore},
    uploads::{LocalUploadStore, UploadStore},
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "resource-gateway starting");

    // Load configuration (fails when the JSON document is missing)
    let config = Config::load()?;

    // Initialize document store backend
    let store: Arc<dyn DocumentStore> = match config.storage.backend {
        StorageBackend::Json => {
            let store = JsonFileStore::open(&config.storage.db_file).await?;
            info!("Using JSON document at: {}", config.storage.db_file);
            Arc::new(store)
        }
        StorageBackend::Supabase => {
            let (Some(url), Some(key)) = (
                config.storage.supabase_url.as_deref(),
                config.storage.supabase_key.as_deref(),
            ) else {
                anyhow::bail!("SUPABASE_URL and SUPABASE_KEY validated in config");
            };
            let store = SupabaseStore::new(url, key)?;
            info!("Using Supabase backend at: {}", url);
            Arc::new(store)
        }
    };

    // Initialize upload directory
    let uploads: Arc<dyn UploadStore> = Arc::new(LocalUploadStore::new(&config.uploads.dir)?);
    info!("Upload directory: {}", config.uploads.dir);

    let resources = ResourceAdapter::new(
        Arc::clone(&store),
        Arc::clone(&uploads),
        config.file_fields.clone(),
    );

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        resources,
        uploads,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
