//! # Backing Stores
//!
//! PostgreSQL implementations of the read and write capabilities the
//! gateway consumes: wearable telemetry adapters and the FIS race and
//! result stores.

pub mod races;
pub mod results;
pub mod wearable;

pub use races::{PgRaceStore, Race, RaceFilter, RaceStore};
pub use results::{AthleteResult, Competitor, PgResultStore, RaceResult, ResultStore};
pub use wearable::{
    PgTelemetryStore, PgWearableSource, TelemetryEntry, TelemetryWriter, WEARABLE_DEVICES,
};

use crate::aggregation::source::{SourceError, SourceResult};
use crate::core::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Build a lazily connecting pool; the first query opens the connection
pub fn connect_pool(name: &str, config: &DatabaseConfig) -> SourceResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .idle_timeout(config.idle_timeout)
        .connect_lazy(&config.url)
        .map_err(|e| SourceError::Unavailable(format!("{} database: {}", name, e)))?;

    info!(database = name, max_connections = config.max_connections, "Database pool created");
    Ok(pool)
}

/// Run one store call under the query timeout
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> SourceResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(SourceError::from),
        Err(_) => Err(SourceError::Timeout(timeout)),
    }
}
