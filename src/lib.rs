//! WellQuery - query resolution and fallback pipeline for health search.
//!
//! Turns a user intent (typed question, voice transcript, scanned barcode,
//! or uploaded image) into a single resolved result while minimizing latency
//! and tolerating partial backend failure. The pipeline drives an ordered
//! fallback chain over a result cache and a set of remote analysis backends,
//! caches successful resolutions opportunistically, honors cooperative
//! cancellation, and projects its current stage into UI-ready progress.
//!
//! This is a library-level contract: no CLI, no rendering, no session
//! management. Hosts construct a [`cache::CacheStore`], wire a
//! [`pipeline::PipelineOrchestrator`], and hand each attempt a token from a
//! [`cancel::AttemptController`].

pub mod backends;
pub mod cache;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod models;
pub mod pipeline;

pub use cache::{CacheStore, MemoryCache};
pub use cancel::{AttemptController, CancellationToken};
pub use classify::{classify_identifier, normalize_gtin14, InputClass};
pub use config::PipelineConfig;
pub use models::{
    BackendResult, CacheEntry, Outcome, Query, QueryInput, QueryOrigin, SourceLabel, Stage,
};
pub use pipeline::{PipelineBackends, PipelineOrchestrator};
