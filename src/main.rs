use anyhow::{Context, Result};
use chunkdrive::{
    blob::{BlobStore, FilesystemBlobStore, MemoryBlobStore, TelegramBlobStore, TelegramConfig},
    config::{AppConfig, BackendKind},
    routes::routes,
    services::{StorageService, metadata_store::MetadataStore},
};
use std::{io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting chunkdrive with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    ensure_database_dir(&cfg.database_url)?;
    let metadata = MetadataStore::connect(&cfg.database_url, 5)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;

    let applied = metadata.run_migrations().await?;
    tracing::info!("Applied {} schema statements", applied);

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Chunk backend ---
    let blobs = build_backend(&cfg).await?;
    if blobs.test_connection().await {
        tracing::info!(backend = blobs.backend_name(), "chunk backend reachable");
    } else {
        tracing::warn!(
            backend = blobs.backend_name(),
            "chunk backend connection test failed; uploads may fail until it recovers"
        );
    }

    // --- Initialize core service ---
    let storage = StorageService::new(metadata, blobs, cfg.limits());

    let cancel = CancellationToken::new();
    let sweeper = cfg.sweep_interval().map(|interval| {
        tracing::info!(
            interval_secs = interval.as_secs(),
            max_age_secs = cfg.temp_chunk_max_age_secs,
            "stale upload sweeper enabled"
        );
        storage.spawn_sweeper(interval, cfg.temp_chunk_max_age(), cancel.clone())
    });

    // --- Build router ---
    let app = routes::app(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    Ok(())
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_database_dir(database_url: &str) -> Result<()> {
    if database_url.contains(":memory:") {
        return Ok(());
    }
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

async fn build_backend(cfg: &AppConfig) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match cfg.backend {
        BackendKind::Telegram => {
            let config = TelegramConfig {
                bot_token: cfg.telegram_bot_token.clone().unwrap_or_default(),
                chat_id: cfg.telegram_chat_id.clone().unwrap_or_default(),
                api_url: cfg.telegram_api_url.clone(),
                max_object_size: cfg.max_object_size,
                timeout: TELEGRAM_TIMEOUT,
            };
            Arc::new(TelegramBlobStore::new(config)?)
        }
        BackendKind::Filesystem => {
            let store = FilesystemBlobStore::new(&cfg.storage_dir, cfg.max_object_size)
                .await
                .with_context(|| format!("preparing storage directory {}", cfg.storage_dir))?;
            tracing::info!("Chunk directory at {}", store.base_path().display());
            Arc::new(store)
        }
        BackendKind::Memory => {
            tracing::warn!("memory backend selected; chunks are lost on restart");
            Arc::new(MemoryBlobStore::new(cfg.max_object_size))
        }
    };
    Ok(store)
}
