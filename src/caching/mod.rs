//! # Response Caching
//!
//! Read-through response cache shared by every domain handler.
//!
//! ## Architecture
//! 1. **Key builder**: canonical keys from a resource prefix and a filter set
//! 2. **Resources**: the catalog of cached resource families and their TTL class
//! 3. **Stores**: raw key/value backends (Redis, in-memory)
//! 4. **Cache manager**: the degrading facade the rest of the gateway talks to
//! 5. **Invalidation**: post-write purging of exact keys and key families
//!
//! The cache is an optimization only. Every failure below the cache manager
//! degrades to a miss or a logged warning; nothing here can fail a request.

pub mod cache_manager;
pub mod invalidation;
pub mod key_builder;
pub mod resources;
pub mod stores;

pub use cache_manager::{CacheBackend, CacheConfig, CacheManager, CacheStats};
pub use invalidation::Invalidator;
pub use key_builder::{build_key, Dimension, FilterSet, FilterValue};
pub use resources::{CacheResource, ResourceDescriptor, Sector, TtlClass};
pub use stores::{CacheEntry, CacheStore, InMemoryCache, RedisCache};

use crate::core::error::GatewayError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },

    #[error("Cache operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::internal(format!("Cache error: {}", err))
    }
}
