//! Near-duplicate lookup over previously resolved queries.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::AnalysisBackend;
use crate::cache::CacheStore;
use crate::models::{BackendResult, Query};

/// Searches prior resolutions for near-duplicates of the query key and
/// serves the highest-ranked (newest) match.
///
/// Similarity hits are approximate: the orchestrator never writes them back
/// under the original key.
pub struct SimilarityLookup {
    cache: Arc<dyn CacheStore>,
}

impl SimilarityLookup {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl AnalysisBackend for SimilarityLookup {
    fn name(&self) -> &'static str {
        "similarity"
    }

    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult {
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        let Some(key) = query.key() else {
            return BackendResult::Miss;
        };
        let matches = self.cache.find_similar(key).await;
        match matches.into_iter().next() {
            Some(entry) => {
                debug!(key, matched = %entry.key, "similar prior result found");
                BackendResult::Success(entry.payload)
            }
            None => BackendResult::Miss,
        }
    }
}
