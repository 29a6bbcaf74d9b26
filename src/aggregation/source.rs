//! Backing-store capability consumed by the aggregator.

use crate::core::error::GatewayError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by backing stores
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Distinguished: fan-out treats it as zero records
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("source call timed out after {0:?}")]
    Timeout(Duration),

    /// Write collided with an existing row
    #[error("conflict on {constraint}")]
    Conflict { constraint: String },

    /// Input the database rejected (bad foreign key, malformed value)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            sqlx::Error::Database(db)
                if db.is_foreign_key_violation() || db.is_check_violation() =>
            {
                Self::InvalidInput(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<SourceError> for GatewayError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { what } => GatewayError::not_found(what),
            SourceError::Timeout(timeout) => GatewayError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            SourceError::Unavailable(reason) => GatewayError::ServiceUnavailable {
                service: "database".to_string(),
                reason,
            },
            SourceError::Conflict { constraint } => GatewayError::Conflict {
                reason: format!("row already exists ({})", constraint),
            },
            SourceError::InvalidInput(reason) => GatewayError::unprocessable(reason),
            SourceError::Query(message) => GatewayError::internal(message),
        }
    }
}

/// Discriminators every telemetry adapter understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    /// Data kind, e.g. `sleep` or `activity`
    pub kind: String,
}

impl RecordFilter {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// Inclusive date bounds, either side optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(after: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        Self { after, before }
    }

    /// `after` must not be later than `before`
    pub fn is_ordered(&self) -> bool {
        match (self.after, self.before) {
            (Some(after), Some(before)) => after <= before,
            _ => true,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.after.map_or(true, |after| date >= after)
            && self.before.map_or(true, |before| date <= before)
    }
}

/// One row returned by an adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub date: NaiveDate,
    pub data: serde_json::Value,
}

/// A record labelled with the adapter it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedRecord {
    pub device: String,
    pub date: NaiveDate,
    pub data: serde_json::Value,
}

impl TaggedRecord {
    pub fn new(device: impl Into<String>, record: SourceRecord) -> Self {
        Self {
            device: device.into(),
            date: record.date,
            data: record.data,
        }
    }
}

/// Uniform read capability of one backing store
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provenance label, also the value of the `device` filter
    fn name(&self) -> &str;

    /// Newest records first, at most `limit`
    async fn fetch_latest(
        &self,
        subject: Uuid,
        filter: &RecordFilter,
        limit: u32,
    ) -> SourceResult<Vec<SourceRecord>>;

    /// Records within `range`, oldest first
    async fn fetch_range(
        &self,
        subject: Uuid,
        filter: &RecordFilter,
        range: DateRange,
    ) -> SourceResult<Vec<SourceRecord>>;
}

/// Adapters in declaration order; merge order follows it
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an adapter. A second adapter with the same name replaces the
    /// first in place.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        match self.adapters.iter().position(|a| a.name() == adapter.name()) {
            Some(i) => self.adapters[i] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    /// The adapter named by `device`, or all of them
    pub fn select(&self, device: Option<&str>) -> Vec<Arc<dyn SourceAdapter>> {
        match device {
            Some(name) => self.get(name).into_iter().collect(),
            None => self.adapters.clone(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.iter().any(|a| a.name() == name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    struct Named(&'static str);

    #[async_trait]
    impl SourceAdapter for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch_latest(&self, _: Uuid, _: &RecordFilter, _: u32) -> SourceResult<Vec<SourceRecord>> {
            Ok(Vec::new())
        }

        async fn fetch_range(&self, _: Uuid, _: &RecordFilter, _: DateRange) -> SourceResult<Vec<SourceRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_registry_keeps_declaration_order() {
        let registry = SourceRegistry::new()
            .with(Arc::new(Named("garmin")))
            .with(Arc::new(Named("oura")))
            .with(Arc::new(Named("polar")))
            .with(Arc::new(Named("oura")));

        assert_eq!(registry.names(), vec!["garmin", "oura", "polar"]);
        assert_eq!(registry.select(None).len(), 3);
        assert_eq!(registry.select(Some("polar")).len(), 1);
        assert!(registry.select(Some("fitbit")).is_empty());
    }

    #[test]
    fn test_date_range() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let range = DateRange::new(Some(d("2024-01-01")), Some(d("2024-01-31")));

        assert!(range.is_ordered());
        assert!(range.contains(d("2024-01-01")));
        assert!(range.contains(d("2024-01-31")));
        assert!(!range.contains(d("2024-02-01")));
        assert!(!DateRange::new(Some(d("2024-02-01")), Some(d("2024-01-01"))).is_ordered());
        assert!(DateRange::default().contains(d("1999-12-31")));
    }

    #[test]
    fn test_error_mapping() {
        assert!(SourceError::from(sqlx::Error::RowNotFound).is_not_found());
        assert_eq!(
            GatewayError::from(SourceError::not_found("race 7")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::from(SourceError::Timeout(Duration::from_secs(7))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::from(SourceError::Query("syntax".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
