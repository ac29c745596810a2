//! Filebox Server - file metadata service
//!
//! Serves owner-scoped file listing, upload, rename and search over a
//! read-through cache, grants time-limited public share links and sweeps
//! expired files from the blob store and the database.

use filebox_db::migrate::migrate;
use filebox_server::blob::HttpBlobStore;
use filebox_server::cache::{FileCache, MokaCache};
use filebox_server::clock::SystemClock;
use filebox_server::service::FileService;
use filebox_server::share::ShareLinkManager;
use filebox_server::store::PgMetadataStore;
use filebox_server::sweeper::ExpirySweeper;
use filebox_server::{create_router, start_server, AppState, Config, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("filebox_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let config = Config::from_env();
    info!(port = config.port, "Starting filebox-server");
    info!("Blob store: {}", config.blob_store_url);
    info!(
        cache_ttl_secs = config.core.cache_ttl.as_secs(),
        share_window_secs = config.core.share_window.as_secs(),
        sweep_interval_secs = config.core.sweep_interval.as_secs(),
        retention_secs = config.core.file_retention.map(|r| r.as_secs()),
        "Core windows"
    );

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    migrate(&pool).await?;

    let core = &config.core;
    let store = Arc::new(PgMetadataStore::new(pool));
    let blobs = Arc::new(HttpBlobStore::new(&config.blob_store_url)?);
    let cache = Arc::new(FileCache::new(
        Arc::new(MokaCache::new(core.cache_max_entries)),
        core.cache_ttl,
        core.cache_timeout,
    ));
    let clock = Arc::new(SystemClock);

    let shares = ShareLinkManager::new(
        store.clone(),
        cache.clone(),
        clock.clone(),
        core.share_window,
        &config.public_url,
    );
    let files = Arc::new(FileService::new(
        store.clone(),
        blobs.clone(),
        cache.clone(),
        clock.clone(),
        shares,
        core.file_retention,
    ));
    let sweeper = Arc::new(ExpirySweeper::new(
        store,
        blobs,
        cache,
        clock,
        core.sweep_interval,
    ));
    sweeper.clone().spawn();

    let state = AppState::new(files, sweeper);
    let router = create_router(state, &config.cors_origins, config.max_upload_bytes);

    // Start HTTP server (blocking)
    start_server(router, config.port).await?;

    Ok(())
}
