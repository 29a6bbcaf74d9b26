//! # Cache Stores
//!
//! Raw key/value backends behind the [`CacheStore`] trait. Stores report
//! every failure; deciding that a failure means "miss" is the job of
//! [`CacheManager`](crate::caching::CacheManager).

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryCache;
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::CacheResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// One cached response body.
///
/// Entries are never updated in place: invalidation deletes them and the
/// next read stores a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,

    /// Serialized JSON, served back byte for byte
    pub value: Bytes,

    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }
}

/// Trait for cache store implementations
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value; `Ok(None)` on a miss
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Store an entry with its TTL, replacing any previous value
    async fn set(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Delete one key. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    ///
    /// Not atomic: keys written while the sweep runs may survive it.
    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<usize>;

    async fn health_check(&self) -> CacheResult<bool>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
