//! # KUHA Gateway - Main Entry Point
//!
//! Startup order: configuration (file, then `GATEWAY_*` overrides), logging,
//! cache, database pools and stores, router, then the server loop with
//! graceful shutdown on SIGINT/SIGTERM.

use anyhow::{anyhow, Context};
use kuha_gateway::aggregation::Aggregator;
use kuha_gateway::auth::{AccessPolicy, AuthState};
use kuha_gateway::caching::{CacheManager, Invalidator};
use kuha_gateway::gateway::{build_router, AppState, HttpServer};
use kuha_gateway::observability::init_logging;
use kuha_gateway::sources::{self, PgRaceStore, PgResultStore, PgTelemetryStore};
use kuha_gateway::GatewayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH")
        .unwrap_or_else(|_| "config/gateway.yaml".to_string());

    let config = GatewayConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("loading configuration from {}", config_path))?;

    init_logging(&config.observability.logging);
    info!(version = kuha_gateway::VERSION, config = %config_path, "Starting KUHA gateway");

    let cache = Arc::new(
        CacheManager::from_config(config.cache.clone())
            .await
            .context("initializing cache")?,
    );

    let query_timeout = config.sources.query_timeout;
    let fis_pool = sources::connect_pool("fis", &config.sources.fis)?;
    let utv_pool = sources::connect_pool("utv", &config.sources.utv)?;

    let (registry, telemetry) = PgTelemetryStore::connect(utv_pool, query_timeout);
    let races = PgRaceStore::new(fis_pool.clone(), query_timeout);
    let results = PgResultStore::new(fis_pool, query_timeout);

    let policy = AccessPolicy::from_config(&config.auth.roles)
        .map_err(|invalid| anyhow!("invalid auth.roles grants: {}", invalid.join("; ")))?;
    let mut roles: Vec<&str> = policy.roles().collect();
    roles.sort_unstable();
    info!(roles = ?roles, "Access policy loaded");
    let auth = Arc::new(AuthState::new(&config.auth, policy));

    let state = AppState {
        aggregator: Aggregator::new(cache.clone(), Arc::new(registry), query_timeout),
        invalidator: Invalidator::new(cache),
        races: Arc::new(races),
        results: Arc::new(results),
        telemetry: Arc::new(telemetry),
    };
    let app = build_router(state, auth, config.server.request_timeout);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port)
        .parse()
        .context("invalid server bind address")?;

    let stop = Arc::new(Notify::new());
    let server_stop = stop.clone();
    let mut server = tokio::spawn(
        HttpServer::new(app, bind_addr).start(async move { server_stop.notified().await }),
    );

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining in-flight requests");
        }
    }

    stop.notify_one();
    match tokio::time::timeout(config.server.shutdown_grace, server).await {
        Ok(result) => result??,
        Err(_) => warn!(grace = ?config.server.shutdown_grace, "Grace period elapsed, forcing shutdown"),
    }

    info!("KUHA gateway stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
}
