//! Exact-key cache lookup backend.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::AnalysisBackend;
use crate::cache::CacheStore;
use crate::models::{BackendResult, Query};

/// Reads previously resolved results from the cache by normalized key.
///
/// Queries without a key (raw image uploads) always miss: there is nothing
/// to look up until an identifier is known.
pub struct CacheLookup {
    cache: Arc<dyn CacheStore>,
}

impl CacheLookup {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl AnalysisBackend for CacheLookup {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let Some(key) = query.key() else {
            return BackendResult::Miss;
        };
        match self.cache.get(key).await {
            Some(entry) => {
                debug!(key, source = %entry.source, "cache hit");
                BackendResult::Success(entry.payload)
            }
            None => BackendResult::Miss,
        }
    }
}
