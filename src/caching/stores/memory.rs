//! # In-Memory Cache Store
//!
//! Process-local [`CacheStore`] on a concurrent hash map. Used for single
//! instance deployments and in tests; it has the same TTL and prefix
//! semantics as the Redis store.

use super::{CacheEntry, CacheStore};
use crate::caching::CacheResult;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default upper bound on live entries
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache implementation
#[derive(Debug)]
pub struct InMemoryCache {
    entries: DashMap<String, StoredValue>,
    max_entries: usize,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "Purged expired in-memory cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let now = Instant::now();

        if let Some(stored) = self.entries.get(key) {
            if !stored.is_expired(now) {
                return Ok(Some(stored.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.entries.remove_if(key, |_, stored| stored.is_expired(now));
        Ok(None)
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&entry.key) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                debug!(key = %entry.key, "In-memory cache full, entry not stored");
                return Ok(());
            }
        }

        self.entries.insert(
            entry.key.clone(),
            StoredValue {
                value: entry.value.clone(),
                expires_at: Instant::now() + entry.ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|item| item.key().starts_with(prefix))
            .map(|item| item.key().clone())
            .collect();

        let mut removed = 0;
        for key in doomed {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, ttl: Duration) -> CacheEntry {
        CacheEntry::new(key, Bytes::from_static(b"{}"), ttl)
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let cache = InMemoryCache::default();
        cache.set(&entry("a", Duration::from_secs(60))).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), Some(Bytes::from_static(b"{}")));
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_miss() {
        let cache = InMemoryCache::default();
        cache.set(&entry("short", Duration::from_millis(10))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_prefix_only_touches_matching_keys() {
        let cache = InMemoryCache::default();
        for key in ["races:season=2024", "races:season=2025", "races", "results:x"] {
            cache.set(&entry(key, Duration::from_secs(60))).await.unwrap();
        }

        assert_eq!(cache.delete_by_prefix("races:").await.unwrap(), 2);
        assert!(cache.get("races").await.unwrap().is_some());
        assert!(cache.get("results:x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_full_cache_skips_new_keys() {
        let cache = InMemoryCache::new(1);
        cache.set(&entry("a", Duration::from_secs(60))).await.unwrap();
        cache.set(&entry("b", Duration::from_secs(60))).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = InMemoryCache::default();
        cache.set(&entry("gone", Duration::from_millis(1))).await.unwrap();
        cache.set(&entry("kept", Duration::from_secs(60))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
