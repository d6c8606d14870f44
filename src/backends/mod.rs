//! Analysis backends: uniform adapters over the remote capabilities.
//!
//! Each backend wraps one remote call (or cache read) and maps every error
//! path into [`BackendResult`] at the adapter boundary, so the orchestrator
//! can drive heterogeneous stages through one interface. Backends never
//! panic or surface raw transport errors.

mod barcode;
mod cache_lookup;
mod http;
mod image;
mod primary;
mod product;
mod similarity;

pub use barcode::BarcodeLookup;
pub use cache_lookup::CacheLookup;
pub use http::{ApiHealth, ScannerClient};
pub use image::ImageUploadAnalyzer;
pub use primary::PrimaryAnalyzer;
pub use product::ProductNameLookup;
pub use similarity::SimilarityLookup;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{BackendResult, Query};

/// A single analysis capability behind the fallback chain.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Execute the call.
    ///
    /// Implementations check the token before starting and treat an abort
    /// observed mid-call as `Cancelled`, never `Failed`: a cancelled attempt
    /// must not trigger fallback, while a genuine failure must.
    async fn call(&self, query: &Query, token: &CancellationToken) -> BackendResult;
}
