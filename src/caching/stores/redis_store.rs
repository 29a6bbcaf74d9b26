//! # Redis Cache Store
//!
//! Redis-backed [`CacheStore`]. All keys live under a configurable
//! namespace so the gateway can share a Redis instance with other services.
//!
//! Prefix deletion walks the keyspace with `SCAN ... MATCH ... COUNT` and
//! deletes each round's keys with a single `DEL`, so it never blocks Redis
//! the way `KEYS` would and it interleaves freely with concurrent traffic.

use super::{CacheEntry, CacheStore};
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use bytes::Bytes;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Namespace prepended to every cache key
    pub key_prefix: String,

    /// Keys requested per `SCAN` round during prefix deletion
    pub scan_batch_size: usize,

    /// Extra attempts after a failed command
    pub max_retries: u32,

    /// Base delay between attempts, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "kuha:".to_string(),
            scan_batch_size: 1000,
            max_retries: 1,
            retry_delay: Duration::from_millis(50),
        }
    }
}

type RedisFuture<T> = Pin<Box<dyn Future<Output = RedisResult<T>> + Send>>;

/// Redis cache implementation
pub struct RedisCache {
    config: RedisCacheConfig,

    /// Multiplexed connection; reconnects on its own after failures
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new(client).await?;

        info!(url = %config.url, namespace = %config.key_prefix, "Redis cache connected");

        Ok(Self { config, connection })
    }

    /// Get the full cache key with namespace
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Execute a Redis operation, retrying transient failures
    async fn execute_with_retry<F, T>(&self, operation: F) -> CacheResult<T>
    where
        F: Fn(ConnectionManager) -> RedisFuture<T>,
        T: Send,
    {
        let mut retries = 0;

        loop {
            match operation(self.connection.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if retries >= self.config.max_retries || !is_transient(&e) {
                        return Err(CacheError::Redis(e));
                    }

                    retries += 1;
                    warn!(attempt = retries, error = %e, "Redis command failed, retrying");
                    tokio::time::sleep(self.config.retry_delay * retries).await;
                }
            }
        }
    }
}

fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
}

/// Escape glob metacharacters so a literal prefix can be used with `MATCH`
pub(crate) fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let full_key = self.full_key(key);

        let value: Option<Vec<u8>> = self
            .execute_with_retry(|mut conn| {
                let full_key = full_key.clone();
                Box::pin(async move { conn.get::<_, Option<Vec<u8>>>(&full_key).await })
            })
            .await?;

        Ok(value.map(Bytes::from))
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        let full_key = self.full_key(&entry.key);
        // SET EX rejects 0; sub-second TTLs round up to one second.
        let ttl_seconds = entry.ttl.as_secs().max(1);
        let value = entry.value.clone();

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            let value = value.clone();
            Box::pin(async move {
                conn.set_ex::<_, _, ()>(&full_key, value.as_ref(), ttl_seconds)
                    .await
            })
        })
        .await?;

        debug!(key = %entry.key, ttl = ?entry.ttl, "Redis cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        let deleted: i64 = self
            .execute_with_retry(|mut conn| {
                let full_key = full_key.clone();
                Box::pin(async move { conn.del::<_, i64>(&full_key).await })
            })
            .await?;

        Ok(deleted > 0)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));
        let batch_size = self.config.scan_batch_size;

        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .execute_with_retry(|mut conn| {
                    let pattern = pattern.clone();
                    Box::pin(async move {
                        redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(batch_size)
                            .query_async::<_, (u64, Vec<String>)>(&mut conn)
                            .await
                    })
                })
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = self
                    .execute_with_retry(|mut conn| {
                        let keys = keys.clone();
                        Box::pin(async move { conn.del::<_, i64>(&keys).await })
                    })
                    .await?;
                removed += deleted.max(0) as usize;
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        debug!(prefix, removed, "Redis prefix sweep finished");
        Ok(removed)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let response: String = self
            .execute_with_retry(|mut conn| {
                Box::pin(async move { redis::cmd("PING").query_async::<_, String>(&mut conn).await })
            })
            .await?;

        Ok(response == "PONG")
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
