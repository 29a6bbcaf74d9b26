//! # Aggregator
//!
//! Read-through over the response cache.
//!
//! 1. build the key from the resource prefix and the normalized filters
//! 2. on a hit, return the cached bytes untouched
//! 3. on a miss, call the store (single source) or every selected adapter
//!    concurrently (fan-out)
//! 4. serialize, cache with the resource TTL, return
//!
//! Fan-out skips failing adapters and never caches an empty merge. Both
//! paths write to the cache only after the whole computation finished, so
//! a request dropped mid-flight leaves the cache untouched.

use super::source::{
    DateRange, RecordFilter, SourceAdapter, SourceError, SourceRecord, SourceRegistry,
    SourceResult, TaggedRecord,
};
use crate::caching::key_builder::{Dimension, FilterSet};
use crate::caching::resources::{self, CacheResource};
use crate::caching::CacheManager;
use crate::core::error::{GatewayError, GatewayResult};
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a response body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    Cached,
    Computed,
}

impl CacheOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "hit",
            Self::Computed => "miss",
        }
    }
}

/// Result of a read-through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Serialized JSON, identical whether cached or computed
    Fresh { body: Bytes, origin: CacheOrigin },
    NoContent,
}

impl ReadOutcome {
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Fresh { body, .. } => Some(body),
            Self::NoContent => None,
        }
    }

    pub fn origin(&self) -> Option<CacheOrigin> {
        match self {
            Self::Fresh { origin, .. } => Some(*origin),
            Self::NoContent => None,
        }
    }
}

/// Tally of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: Vec<String>,
}

impl FanOutReport {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.not_found == 0 && !self.failed.is_empty()
    }
}

/// Partial-failure policy of the fan-out.
///
/// Results are merged in the order given (adapter declaration order), each
/// adapter's records keep their own order. `NotFound` counts as zero
/// records; any other error drops that adapter's contribution.
pub fn merge_skipping_failures(
    results: Vec<(String, SourceResult<Vec<SourceRecord>>)>,
) -> (Vec<TaggedRecord>, FanOutReport) {
    let mut merged = Vec::new();
    let mut report = FanOutReport::default();

    for (name, result) in results {
        match result {
            Ok(records) => {
                report.succeeded += 1;
                merged.extend(records.into_iter().map(|r| TaggedRecord::new(name.as_str(), r)));
            }
            Err(e) if e.is_not_found() => report.not_found += 1,
            Err(e) => {
                warn!(source = %name, error = %e, "Source failed, skipping");
                report.failed.push(name);
            }
        }
    }

    (merged, report)
}

fn encode<T: Serialize>(value: &T) -> GatewayResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| GatewayError::internal(format!("failed to serialize response: {}", e)))
}

/// Latest telemetry across devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestQuery {
    pub subject: Uuid,
    pub filter: RecordFilter,
    pub device: Option<String>,
    pub limit: u32,
}

impl LatestQuery {
    pub fn filters(&self) -> FilterSet {
        FilterSet::new()
            .with(Dimension::Subject, self.subject)
            .with(Dimension::Kind, self.filter.kind.as_str())
            .with_opt(Dimension::Device, self.device.as_deref())
            .with(Dimension::Limit, self.limit)
    }
}

/// Telemetry in a date range across every device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub subject: Uuid,
    pub filter: RecordFilter,
    pub range: DateRange,
}

impl RangeQuery {
    pub fn filters(&self) -> FilterSet {
        FilterSet::new()
            .with(Dimension::Subject, self.subject)
            .with(Dimension::Kind, self.filter.kind.as_str())
            .with_opt(Dimension::After, self.range.after)
            .with_opt(Dimension::Before, self.range.before)
    }
}

/// Cache-backed read path
#[derive(Clone)]
pub struct Aggregator {
    cache: Arc<CacheManager>,
    sources: Arc<SourceRegistry>,
    call_timeout: Duration,
}

impl Aggregator {
    pub fn new(cache: Arc<CacheManager>, sources: Arc<SourceRegistry>, call_timeout: Duration) -> Self {
        Self {
            cache,
            sources,
            call_timeout,
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    async fn bounded<T, F>(&self, call: F) -> SourceResult<T>
    where
        F: Future<Output = SourceResult<T>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or(Err(SourceError::Timeout(self.call_timeout)))
    }

    /// Single-source read-through. Store errors propagate to the caller.
    ///
    /// Whatever the store returns is cached, an empty list included.
    pub async fn read_through<T, F, Fut>(
        &self,
        resource: &CacheResource,
        filters: &FilterSet,
        fetch: F,
    ) -> GatewayResult<ReadOutcome>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let key = resource.key(filters);

        if let Some(body) = self.cache.get(&key).await {
            return Ok(ReadOutcome::Fresh {
                body,
                origin: CacheOrigin::Cached,
            });
        }

        let value = self.bounded(fetch()).await?;
        let body = encode(&value)?;

        self.cache
            .set(&key, body.clone(), self.cache.ttl_for(resource.ttl_class()))
            .await;

        Ok(ReadOutcome::Fresh {
            body,
            origin: CacheOrigin::Computed,
        })
    }

    /// Fan a read out to `adapters` and merge under the skip-failures
    /// policy. An empty merge is "no content" and is not cached.
    pub async fn fan_out<F, Fut>(
        &self,
        resource: &CacheResource,
        filters: &FilterSet,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        call: F,
    ) -> GatewayResult<ReadOutcome>
    where
        F: Fn(Arc<dyn SourceAdapter>) -> Fut,
        Fut: Future<Output = SourceResult<Vec<SourceRecord>>>,
    {
        let key = resource.key(filters);

        if let Some(body) = self.cache.get(&key).await {
            return Ok(ReadOutcome::Fresh {
                body,
                origin: CacheOrigin::Cached,
            });
        }

        let calls = adapters.into_iter().map(|adapter| {
            let name = adapter.name().to_string();
            let fut = self.bounded(call(adapter));
            async move { (name, fut.await) }
        });
        let results = join_all(calls).await;

        let (merged, report) = merge_skipping_failures(results);

        if merged.is_empty() {
            if report.all_failed() {
                warn!(key = %key, failed = ?report.failed, "Every source failed, answering no content");
            } else {
                debug!(key = %key, "No records from any source");
            }
            return Ok(ReadOutcome::NoContent);
        }

        let body = encode(&merged)?;
        self.cache
            .set(&key, body.clone(), self.cache.ttl_for(resource.ttl_class()))
            .await;

        debug!(
            key = %key,
            records = merged.len(),
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "Fan-out merged"
        );

        Ok(ReadOutcome::Fresh {
            body,
            origin: CacheOrigin::Computed,
        })
    }

    /// Latest records of one kind, from one device or all of them
    pub async fn latest(&self, query: &LatestQuery) -> GatewayResult<ReadOutcome> {
        let adapters = self.sources.select(query.device.as_deref());
        let subject = query.subject;
        let limit = query.limit;

        self.fan_out(&resources::utv_latest(), &query.filters(), adapters, |adapter| {
            let filter = query.filter.clone();
            async move { adapter.fetch_latest(subject, &filter, limit).await }
        })
        .await
    }

    /// Records of one kind in a date range, from every device
    pub async fn range(&self, query: &RangeQuery) -> GatewayResult<ReadOutcome> {
        let adapters = self.sources.select(None);
        let subject = query.subject;
        let range = query.range;

        self.fan_out(&resources::utv_all(), &query.filters(), adapters, |adapter| {
            let filter = query.filter.clone();
            async move { adapter.fetch_range(subject, &filter, range).await }
        })
        .await
    }
}
