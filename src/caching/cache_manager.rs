//! # Cache Manager
//!
//! The facade handlers and the aggregator talk to. It turns a raw
//! [`CacheStore`] into a best-effort cache:
//!
//! - `get` never fails: errors and timeouts are logged and read as a miss
//! - `set` never fails: errors are logged and dropped
//! - deletes report their errors so the invalidator can log them
//!
//! Every store call is bounded by `operation_timeout`, except prefix
//! sweeps: those may take several SCAN rounds and run under
//! `sweep_timeout` instead.

use super::resources::TtlClass;
use super::stores::{CacheEntry, CacheStore, InMemoryCache, RedisCache, RedisCacheConfig};
use super::{CacheError, CacheResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which store backs the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    pub redis: RedisCacheConfig,

    /// Entry cap for the in-memory backend
    pub memory_max_entries: usize,

    /// TTL for code lists and race data
    #[serde(with = "humantime_serde")]
    pub reference_ttl: Duration,

    /// TTL for per-user telemetry aggregations
    #[serde(with = "humantime_serde")]
    pub volatile_ttl: Duration,

    /// Upper bound for a single-key cache call
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Upper bound for a whole prefix sweep
    #[serde(with = "humantime_serde")]
    pub sweep_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis: RedisCacheConfig::default(),
            memory_max_entries: super::stores::memory::DEFAULT_MAX_ENTRIES,
            reference_ttl: Duration::from_secs(6 * 60 * 60),
            volatile_ttl: Duration::from_secs(10 * 60),
            operation_timeout: Duration::from_secs(2),
            sweep_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Reference => self.reference_ttl,
            TtlClass::Volatile => self.volatile_ttl,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Failed or timed out store calls, all operations
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

/// Degrading cache facade
pub struct CacheManager {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    counters: Counters,
}

impl CacheManager {
    /// Build the configured backend
    pub async fn from_config(config: CacheConfig) -> CacheResult<Self> {
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Redis => Arc::new(RedisCache::new(config.redis.clone()).await?),
            CacheBackend::Memory => {
                let cache = Arc::new(InMemoryCache::new(config.memory_max_entries));
                cache.spawn_sweeper(Duration::from_secs(60));
                cache
            }
        };

        info!(backend = store.backend_name(), "Cache manager initialized");
        Ok(Self::new(store, config))
    }

    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            config,
            store,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_for(&self, class: TtlClass) -> Duration {
        self.config.ttl_for(class)
    }

    async fn bounded<T, F>(&self, operation: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        self.bounded_by(self.config.operation_timeout, operation).await
    }

    async fn bounded_by<T, F>(&self, limit: Duration, operation: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let result = match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(limit)),
        };
        if result.is_err() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Look up a key. Any failure reads as a miss.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        match self.bounded(self.store.get(key)).await {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value. Failures are logged and dropped.
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(key, value, ttl);
        match self.bounded(self.store.set(&entry)).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                debug!(key, ?ttl, "Cached response");
            }
            Err(e) => warn!(key, error = %e, "Cache write failed"),
        }
    }

    /// Delete one key; absent keys are not an error
    pub async fn delete_exact(&self, key: &str) -> CacheResult<bool> {
        self.bounded(self.store.delete(key)).await
    }

    /// Delete every key under `prefix`, bounded by `sweep_timeout`
    pub async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        self.bounded_by(self.config.sweep_timeout, self.store.delete_by_prefix(prefix))
            .await
    }

    pub async fn health_check(&self) -> bool {
        match self.bounded(self.store.health_check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(backend = self.store.backend_name(), error = %e, "Cache health check failed");
                false
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
