//! `selfpass` server entry point.
//!
//! Opens the storage backend, loads the configuration document and the user
//! directory, then serves the router with graceful shutdown. A background
//! session reaper runs alongside the server and stops on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use selfpass_storage::{FileBackend, MemoryBackend, StorageBackend};

use selfpass_server::build_router;
use selfpass_server::config::{ServerConfig, StorageBackendType};
use selfpass_server::directory::{MemoryDirectory, UserDirectory};
use selfpass_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "selfpass starting");

    let state = Arc::new(build_app_state(&config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        let interval_secs = config.session_scan_interval_secs;
        tokio::spawn(async move {
            session_reaper(state, &mut rx, interval_secs).await;
        })
    };

    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "selfpass server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), reaper_handle).await;

    info!("selfpass server stopped");
    Ok(())
}

async fn build_app_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let storage: Arc<dyn StorageBackend> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (configuration will not persist)");
            Arc::new(MemoryBackend::new())
        }
        StorageBackendType::File { path } => {
            info!(path = %path, "using file storage");
            Arc::new(FileBackend::open(path).context("failed to open file storage")?)
        }
    };

    let directory: Arc<dyn UserDirectory> = match &config.users_file {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read users file {path}"))?;
            let directory = MemoryDirectory::from_json(&json)
                .await
                .with_context(|| format!("failed to load users file {path}"))?;
            info!(path = %path, "user directory loaded");
            Arc::new(directory)
        }
        None => {
            warn!("no users file configured, user logins will fail");
            Arc::new(MemoryDirectory::new())
        }
    };

    if config.security_key.is_none() {
        warn!("SELFPASS_SECURITY_KEY not set, deriving the secret key from the document creation time");
    }

    AppState::load(
        storage,
        config.config_key.clone(),
        config.security_key.as_deref(),
        directory,
    )
    .await
    .context("failed to initialize application state")
}

/// Evicts idle sessions every `interval_secs` until shutdown.
async fn session_reaper(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "session reaper started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let idle_timeout = state.runtime().await.idle_timeout;
                let evicted = state.sessions.evict_idle(idle_timeout).await;
                if evicted > 0 {
                    let remaining = state.sessions.len().await;
                    info!(evicted, remaining, "idle sessions evicted");
                }
                let pruned = state.intruder.prune().await;
                if pruned > 0 {
                    let remaining = state.intruder.len().await;
                    info!(pruned, remaining, "stale intruder records pruned");
                }
            }
            _ = shutdown.changed() => {
                info!("session reaper shutting down");
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
