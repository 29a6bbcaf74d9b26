//! # Cache Invalidation
//!
//! Purges cache entries a write may have made stale. Invoked by write
//! handlers after the store commits and before the response is sent.

use super::resources::ResourceDescriptor;
use super::CacheManager;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one invalidation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub removed: usize,
    pub failures: usize,
}

/// Post-write cache invalidator
#[derive(Clone)]
pub struct Invalidator {
    cache: Arc<CacheManager>,
}

impl Invalidator {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// Purge every descriptor. Failures are logged and counted, never
    /// returned: the write has already succeeded.
    pub async fn invalidate(&self, targets: &[ResourceDescriptor]) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for target in targets {
            match target {
                ResourceDescriptor::Exact(key) => self.purge_key(key, &mut report).await,
                ResourceDescriptor::Family(prefix) => {
                    // The bare prefix is itself a key when no filters were set.
                    self.purge_key(prefix, &mut report).await;
                    let children = format!("{}{}", prefix, super::key_builder::KEY_DELIMITER);
                    match self.cache.delete_by_prefix(&children).await {
                        Ok(n) => report.removed += n,
                        Err(e) => {
                            report.failures += 1;
                            warn!(prefix = %children, error = %e, "Cache prefix invalidation failed");
                        }
                    }
                }
            }
        }

        debug!(
            targets = targets.len(),
            removed = report.removed,
            failures = report.failures,
            "Cache invalidated"
        );
        report
    }

    async fn purge_key(&self, key: &str, report: &mut InvalidationReport) {
        match self.cache.delete_exact(key).await {
            Ok(true) => report.removed += 1,
            Ok(false) => {}
            Err(e) => {
                report.failures += 1;
                warn!(key, error = %e, "Cache key invalidation failed");
            }
        }
    }
}
