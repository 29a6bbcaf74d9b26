//! Wearable telemetry adapters.
//!
//! Every device has its own table with one row per user and day:
//!
//! ```sql
//! CREATE TABLE oura_data (
//!     user_id      uuid  NOT NULL,
//!     summary_date date  NOT NULL,
//!     data         jsonb NOT NULL,
//!     PRIMARY KEY (user_id, summary_date)
//! );
//! ```
//!
//! `data` maps a data kind (`sleep`, `activity`, ...) to that day's
//! payload. Reads return the payload of one kind; writes merge kinds into
//! the day's row.

use super::bounded;
use crate::aggregation::source::{
    DateRange, RecordFilter, SourceAdapter, SourceError, SourceRecord, SourceRegistry,
    SourceResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Devices in fan-out order
pub const WEARABLE_DEVICES: [&str; 4] = ["garmin", "oura", "polar", "suunto"];

#[derive(Debug, sqlx::FromRow)]
struct WearableRow {
    summary_date: NaiveDate,
    data: serde_json::Value,
}

impl From<WearableRow> for SourceRecord {
    fn from(row: WearableRow) -> Self {
        Self {
            date: row.summary_date,
            data: row.data,
        }
    }
}

/// One day's payload of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

/// Telemetry ingestion
#[async_trait]
pub trait TelemetryWriter: Send + Sync {
    /// Insert or replace `(subject, date, kind)` for every entry, all or
    /// nothing. Returns the number of rows written.
    async fn upsert(
        &self,
        device: &str,
        subject: Uuid,
        entries: &[TelemetryEntry],
    ) -> SourceResult<usize>;
}

/// PostgreSQL adapter for one device table
#[derive(Debug, Clone)]
pub struct PgWearableSource {
    device: String,
    table: String,
    pool: PgPool,
    query_timeout: Duration,
}

impl PgWearableSource {
    pub fn new(device: &str, pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            device: device.to_string(),
            table: format!("{}_data", device),
            pool,
            query_timeout,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn upsert(&self, subject: Uuid, entries: &[TelemetryEntry]) -> SourceResult<usize> {
        let sql = format!(
            "INSERT INTO {table} (user_id, summary_date, data) \
             VALUES ($1, $2, jsonb_build_object($3::text, $4::jsonb)) \
             ON CONFLICT (user_id, summary_date) \
             DO UPDATE SET data = {table}.data || EXCLUDED.data",
            table = self.table
        );

        bounded(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;
            for entry in entries {
                sqlx::query(&sql)
                    .bind(subject)
                    .bind(entry.date)
                    .bind(&entry.kind)
                    .bind(&entry.data)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok::<_, sqlx::Error>(entries.len())
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for PgWearableSource {
    fn name(&self) -> &str {
        &self.device
    }

    async fn fetch_latest(
        &self,
        subject: Uuid,
        filter: &RecordFilter,
        limit: u32,
    ) -> SourceResult<Vec<SourceRecord>> {
        let sql = format!(
            "SELECT summary_date, data -> $2 AS data FROM {} \
             WHERE user_id = $1 AND data ? $2 \
             ORDER BY summary_date DESC LIMIT $3",
            self.table
        );

        let rows: Vec<WearableRow> = bounded(
            self.query_timeout,
            sqlx::query_as(&sql)
                .bind(subject)
                .bind(&filter.kind)
                .bind(i64::from(limit))
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(device = %self.device, rows = rows.len(), "Fetched latest telemetry");
        Ok(rows.into_iter().map(SourceRecord::from).collect())
    }

    async fn fetch_range(
        &self,
        subject: Uuid,
        filter: &RecordFilter,
        range: DateRange,
    ) -> SourceResult<Vec<SourceRecord>> {
        let sql = format!(
            "SELECT summary_date, data -> $2 AS data FROM {} \
             WHERE user_id = $1 AND data ? $2 \
               AND ($3::date IS NULL OR summary_date >= $3) \
               AND ($4::date IS NULL OR summary_date <= $4) \
             ORDER BY summary_date ASC",
            self.table
        );

        let rows: Vec<WearableRow> = bounded(
            self.query_timeout,
            sqlx::query_as(&sql)
                .bind(subject)
                .bind(&filter.kind)
                .bind(range.after)
                .bind(range.before)
                .fetch_all(&self.pool),
        )
        .await?;

        debug!(device = %self.device, rows = rows.len(), "Fetched telemetry range");
        Ok(rows.into_iter().map(SourceRecord::from).collect())
    }
}

/// Telemetry writes routed to the owning device table
#[derive(Debug, Clone, Default)]
pub struct PgTelemetryStore {
    sources: HashMap<String, Arc<PgWearableSource>>,
}

impl PgTelemetryStore {
    /// One adapter per device on a shared pool, plus the write store that
    /// reaches the same tables
    pub fn connect(pool: PgPool, query_timeout: Duration) -> (SourceRegistry, Self) {
        let mut registry = SourceRegistry::new();
        let mut sources = HashMap::new();

        for device in WEARABLE_DEVICES {
            let source = Arc::new(PgWearableSource::new(device, pool.clone(), query_timeout));
            registry.register(source.clone());
            sources.insert(device.to_string(), source);
        }

        (registry, Self { sources })
    }
}

#[async_trait]
impl TelemetryWriter for PgTelemetryStore {
    async fn upsert(
        &self,
        device: &str,
        subject: Uuid,
        entries: &[TelemetryEntry],
    ) -> SourceResult<usize> {
        let source = self
            .sources
            .get(device)
            .ok_or_else(|| SourceError::not_found(format!("device '{}'", device)))?;
        source.upsert(subject, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn test_registry_follows_device_order() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/utv")
            .unwrap();
        let (registry, store) = PgTelemetryStore::connect(pool, Duration::from_secs(7));

        assert_eq!(registry.names(), WEARABLE_DEVICES.to_vec());
        assert_eq!(store.sources["polar"].table(), "polar_data");
    }

    #[test]
    fn test_entry_wire_format() {
        let entry: TelemetryEntry = serde_json::from_value(serde_json::json!({
            "date": "2024-05-01",
            "type": "sleep",
            "data": { "score": 81 }
        }))
        .unwrap();
        assert_eq!(entry.kind, "sleep");
        assert_eq!(entry.data["score"], 81);
    }
}
