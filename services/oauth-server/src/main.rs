//! OAuth 2.1 broker server
//!
//! Single-binary service that:
//! 1. Registers OAuth clients and redeems authorization codes (public listener)
//! 2. Lets the upstream login flow mint codes and the resource proxy resolve
//!    tokens (admin listener)
//! 3. Sweeps expired codes and tokens in the background

mod admin;
mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth_broker::{AuthorizationServer, spawn_sweep_task};
use oauth_core::ClientRegistry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::routes::{AppState, build_router};

/// How long in-flight requests get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

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

    info!("starting oauth-broker-server");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        code_ttl_secs = config.oauth.code_ttl_secs,
        token_ttl_secs = config.oauth.token_ttl_secs,
        require_client_secret = config.oauth.require_client_secret,
        "configuration loaded"
    );

    let registry = match &config.oauth.clients_path {
        Some(path) => ClientRegistry::load(path.clone())
            .await
            .with_context(|| format!("failed to load clients from {}", path.display()))?,
        None => {
            warn!("no clients_path configured, registrations will not survive restart");
            ClientRegistry::in_memory()
        }
    };

    let server = Arc::new(
        AuthorizationServer::new(
            registry,
            config.oauth.code_ttl(),
            config.oauth.token_ttl(),
        )
        .with_client_auth(config.oauth.client_auth()),
    );

    // One watch channel fans the shutdown out to the sweeper and both listeners
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = spawn_sweep_task(
        server.clone(),
        config.oauth.sweep_interval(),
        shutdown_rx.clone(),
    );

    let public_app = build_router(
        AppState::new(server.clone(), prometheus_handle),
        config.server.max_connections,
    );
    let admin_app = build_admin_router(AdminState::new(server.clone()));

    let public_listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;
    let admin_listener = TcpListener::bind(config.server.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin to {}", config.server.admin_addr))?;

    info!(
        addr = %config.server.listen_addr,
        admin_addr = %config.server.admin_addr,
        "accepting requests"
    );

    let public_rx = shutdown_rx.clone();
    let public_handle = tokio::spawn(async move {
        axum::serve(public_listener, public_app)
            .with_graceful_shutdown(wait_for_shutdown(public_rx))
            .await
    });
    let admin_rx = shutdown_rx;
    let admin_handle = tokio::spawn(async move {
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(wait_for_shutdown(admin_rx))
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    // The drain timeout starts at signal receipt, not at server start
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        for (name, handle) in [("public", public_handle), ("admin", admin_handle)] {
            match handle.await {
                Ok(Ok(())) => info!(listener = name, "listener drained"),
                Ok(Err(e)) => error!(listener = name, error = %e, "server error during shutdown"),
                Err(e) => error!(listener = name, error = %e, "server task panicked"),
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        );
    }

    if let Err(e) = sweeper.await {
        error!(error = %e, "sweeper task panicked");
    }

    info!("shutdown complete");
    Ok(())
}

/// Resolve once the shutdown flag flips or its sender goes away.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// If a handler can't be installed that branch never fires; the other one
/// still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
