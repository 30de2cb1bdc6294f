//! Warp Pool Proxy
//!
//! Single-binary Rust service that:
//! 1. Loads Warp accounts from a local file or a base64 env blob
//! 2. Exposes an OpenAI-compatible HTTP surface
//! 3. Rotates accounts round-robin and caches access tokens per account

mod chat;
mod config;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warp_auth::ACCOUNTS_ENV_VAR;
use warp_pool::Pool;

use crate::config::Config;
use crate::routes::AppState;

/// Time allowed for in-flight requests to drain after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting warp-pool-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    // PaaS deployments hand the port over via PORT
    if let Ok(port) = std::env::var("PORT") {
        config
            .apply_port_override(&port)
            .context("invalid PORT env var")?;
    }

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_file = %config.accounts.file.display(),
        token_url = %config.upstream.token_url,
        "configuration loaded"
    );

    let env_blob = std::env::var(ACCOUNTS_ENV_VAR).ok();
    let accounts = warp_auth::load_accounts(&config.accounts.file, env_blob.as_deref());
    if accounts.is_empty() {
        warn!("no accounts loaded, chat requests will fail until accounts are provided");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.refresh_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let pool = Arc::new(Pool::new(
        accounts,
        config.upstream.token_url.clone(),
        client,
    ));

    let state = AppState {
        pool,
        ai_url: config.upstream.ai_url.clone(),
        prometheus: prometheus_handle,
    };
    let app = routes::build_router(state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown: stop accepting new connections on SIGTERM/SIGINT,
    // then race the drain against DRAIN_TIMEOUT so a slow client cannot
    // block process exit. The timer starts at signal receipt.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
