//! Personal file-storage server.
//!
//! Serves the REST API for uploading, organizing and downloading files. File
//! metadata lives in a JSON document; bytes live under the data directory.

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use minidrive::config::Config;
use minidrive::drive::{create_router, AppState, StorageLayout};
use minidrive::store::MetadataStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting minidrive");
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Database: {}", config.db_path.display());

    let store = MetadataStore::open(&config.db_path)?;
    let layout = StorageLayout::new(&config.data_dir);
    layout.ensure_uploads_root().await?;

    let state = AppState::new(store, layout, config.quota_bytes);
    let app = create_router(state, config.max_upload_size)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr();
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
