//! # HTTP Server
//!
//! Router assembly and the serve loop.
//!
//! Layers, outermost first: request tracing, request timeout, bearer
//! authentication. `/health` is reachable without a token.

use crate::aggregation::Aggregator;
use crate::auth::{auth_middleware, AuthState};
use crate::caching::Invalidator;
use crate::core::error::{GatewayError, GatewayResult};
use crate::gateway::handlers::{fis, results, utv};
use crate::sources::{RaceStore, ResultStore, TelemetryWriter};
use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    pub invalidator: Invalidator,
    pub races: Arc<dyn RaceStore>,
    pub results: Arc<dyn ResultStore>,
    pub telemetry: Arc<dyn TelemetryWriter>,
}

/// Build the full application router
pub fn build_router(state: AppState, auth: Arc<AuthState>, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/v1/utv/latest", get(utv::latest))
        .route("/v1/utv/all", get(utv::all))
        .route("/v1/utv/data", axum::routing::post(utv::ingest))
        .route("/v1/fis/:sector/seasons", get(fis::seasons))
        .route("/v1/fis/:sector/disciplines", get(fis::disciplines))
        .route("/v1/fis/:sector/categories", get(fis::categories))
        .route(
            "/v1/fis/:sector/races",
            get(fis::races)
                .post(fis::insert_race)
                .put(fis::update_race)
                .delete(fis::delete_race),
        )
        .route("/v1/fis/:sector/races/last", get(fis::last_race))
        .route(
            "/v1/fis/:sector/results",
            get(results::race_results)
                .post(results::insert_result)
                .put(results::update_result)
                .delete(results::delete_result),
        )
        .route("/v1/fis/:sector/results/last", get(results::last_result))
        .route("/v1/fis/:sector/athletes/results", get(results::athlete_results))
        .route("/v1/fis/:sector/competitors", get(results::competitors));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout))
                .layer(middleware::from_fn_with_state(auth, auth_middleware)),
        )
        .with_state(state)
}

/// Health check endpoint handler.
///
/// Always 200: a broken cache only degrades the gateway.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.aggregator.cache();
    let cache_healthy = cache.health_check().await;
    let stats = cache.stats();

    Json(serde_json::json!({
        "status": if cache_healthy { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "backend": cache.backend_name(),
            "healthy": cache_healthy,
            "hits": stats.hits,
            "misses": stats.misses,
            "hit_ratio": stats.hit_ratio(),
        },
        "sources": state.aggregator.sources().names(),
    }))
}

/// HTTP server bound to one address
pub struct HttpServer {
    app: Router,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(app: Router, bind_addr: SocketAddr) -> Self {
        Self { app, bind_addr }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind server to {}: {}", self.bind_addr, e))
        })?;

        info!("Gateway HTTP server listening on {}", self.bind_addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;

        info!("Gateway HTTP server stopped");
        Ok(())
    }
}
