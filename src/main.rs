//! Layered KV server
//!
//! Serves the configured store chain over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layered_kv::api::{create_router, AppState};
use layered_kv::{spawn_cull_task, Config};

/// Main entry point for the Layered KV server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the store chain
/// 4. Start the background cull task, unless disabled
/// 5. Start HTTP server on configured port
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layered_kv=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Layered KV server");

    let config = Config::from_env();
    info!(
        max_entries_per_collection = config.max_entries_per_collection,
        default_collection = %config.default_collection,
        port = config.server_port,
        cull_interval = config.cull_interval,
        min_ttl = config.min_ttl,
        max_ttl = ?config.max_ttl,
        compression_threshold = config.compression_threshold,
        max_entry_size = config.max_entry_size,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to build store chain")?;
    info!("Store chain initialized");

    let cull_handle = if config.cull_interval > 0 {
        Some(spawn_cull_task(
            state.store.clone(),
            Duration::from_secs(config.cull_interval),
        ))
    } else {
        info!("Cull task disabled");
        None
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cull_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cull task and allows graceful shutdown.
async fn shutdown_signal(cull_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = cull_handle {
        handle.abort();
        warn!("Cull task aborted");
    }
}
