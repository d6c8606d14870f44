//! Pipeline orchestrator: drives one resolution attempt through its
//! fallback chain.
//!
//! The fallback order is data, not control flow: each resolve call builds a
//! list of stage specs and a single chain runner walks it. Adding or removing
//! a fallback stage is a one-line change to the list. Stages run strictly
//! sequentially; the only detached work is the best-effort cache persist,
//! which never blocks or alters the returned outcome.

pub mod progress;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backends::{
    AnalysisBackend, BarcodeLookup, CacheLookup, ImageUploadAnalyzer, PrimaryAnalyzer,
    ProductNameLookup, SimilarityLookup,
};
use crate::cache::CacheStore;
use crate::classify::{classify_identifier, InputClass};
use crate::config::PipelineConfig;
use crate::models::{BackendResult, Outcome, Query, QueryInput, SourceLabel, Stage};

/// Observer invoked synchronously on every stage transition. Must not block;
/// it is never awaited.
pub type StageObserver<'a> = &'a (dyn Fn(Stage) + Sync);

/// One step of a fallback chain: the backend to try, the label a success
/// carries, and whether a success is written back to the cache.
struct StageSpec {
    stage: Stage,
    backend: Arc<dyn AnalysisBackend>,
    source: SourceLabel,
    persist: bool,
}

/// Per-invocation bookkeeping. Created when orchestration begins, dropped
/// when it returns.
struct PipelineAttempt {
    id: Uuid,
    started: Instant,
}

impl PipelineAttempt {
    fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started: Instant::now(),
        }
    }
}

/// The analysis backends an orchestrator resolves against.
///
/// Injected at construction so tests can substitute fakes without global
/// state leaking between cases.
pub struct PipelineBackends {
    pub primary: Arc<dyn AnalysisBackend>,
    pub similarity: Arc<dyn AnalysisBackend>,
    pub barcode: Arc<dyn AnalysisBackend>,
    pub product: Arc<dyn AnalysisBackend>,
    pub image: Arc<dyn AnalysisBackend>,
}

/// Drives queries through cache, primary analysis, and fallback stages.
pub struct PipelineOrchestrator {
    cache: Arc<dyn CacheStore>,
    cache_lookup: Arc<dyn AnalysisBackend>,
    backends: PipelineBackends,
}

impl PipelineOrchestrator {
    pub fn new(cache: Arc<dyn CacheStore>, backends: PipelineBackends) -> Self {
        let cache_lookup = Arc::new(CacheLookup::new(cache.clone()));
        Self {
            cache,
            cache_lookup,
            backends,
        }
    }

    /// Wire the production HTTP adapters from configuration.
    pub fn from_config(config: &PipelineConfig, cache: Arc<dyn CacheStore>) -> Self {
        let timeout = config.request_timeout();
        let backends = PipelineBackends {
            primary: Arc::new(PrimaryAnalyzer::new(&config.search_endpoint, timeout)),
            similarity: Arc::new(SimilarityLookup::new(cache.clone())),
            barcode: Arc::new(BarcodeLookup::new(&config.scanner_endpoint, timeout)),
            product: Arc::new(ProductNameLookup::new(&config.scanner_endpoint, timeout)),
            image: Arc::new(ImageUploadAnalyzer::new(&config.scanner_endpoint, timeout)),
        };
        Self::new(cache, backends)
    }

    /// Resolve a free-text query.
    ///
    /// Chain: cache check, primary analysis (persisted on success), then
    /// similarity over prior results (never persisted under the original
    /// key: an approximate match must not become an exact cache hit).
    pub async fn resolve(
        &self,
        query: Query,
        token: CancellationToken,
        on_stage: Option<StageObserver<'_>>,
    ) -> Outcome {
        match query.as_text() {
            Some(text) if !text.is_empty() => {}
            _ => {
                return Outcome::Failed {
                    reason: "resolve requires non-empty query text".to_string(),
                }
            }
        }

        let stages = vec![
            StageSpec {
                stage: Stage::CacheCheck,
                backend: self.cache_lookup.clone(),
                source: SourceLabel::Cache,
                persist: false,
            },
            StageSpec {
                stage: Stage::PrimaryResolve,
                backend: self.backends.primary.clone(),
                source: SourceLabel::Primary,
                persist: true,
            },
            StageSpec {
                stage: Stage::FallbackResolve,
                backend: self.backends.similarity.clone(),
                source: SourceLabel::Similar,
                persist: false,
            },
        ];
        self.run_chain(query, token, stages, on_stage).await
    }

    /// Resolve a scan-style input: an identifier string or raw image bytes.
    ///
    /// The cache is checked only when an identifier is already known. Exactly
    /// one of the barcode / product-name / image stages runs per attempt,
    /// chosen by input shape; they are mutually exclusive, not a chain among
    /// themselves.
    pub async fn resolve_scan(
        &self,
        query: Query,
        token: CancellationToken,
        on_stage: Option<StageObserver<'_>>,
    ) -> Outcome {
        let mut stages = Vec::with_capacity(2);
        if query.key().is_some() {
            stages.push(StageSpec {
                stage: Stage::CacheCheck,
                backend: self.cache_lookup.clone(),
                source: SourceLabel::Cache,
                persist: false,
            });
        }

        let analyzer = match query.input() {
            QueryInput::ImageBytes { .. } => StageSpec {
                stage: Stage::ImageResolve,
                backend: self.backends.image.clone(),
                source: SourceLabel::Image,
                persist: true,
            },
            QueryInput::Identifier(raw) => match classify_identifier(raw) {
                InputClass::Barcode => StageSpec {
                    stage: Stage::BarcodeResolve,
                    backend: self.backends.barcode.clone(),
                    source: SourceLabel::Barcode,
                    persist: true,
                },
                InputClass::ProductName => StageSpec {
                    stage: Stage::ProductResolve,
                    backend: self.backends.product.clone(),
                    source: SourceLabel::Product,
                    persist: true,
                },
                InputClass::ImageReference => StageSpec {
                    stage: Stage::ImageResolve,
                    backend: self.backends.image.clone(),
                    source: SourceLabel::Image,
                    persist: true,
                },
            },
            QueryInput::Text(_) => {
                return Outcome::Failed {
                    reason: "scan resolution requires an identifier or image".to_string(),
                }
            }
        };
        stages.push(analyzer);

        self.run_chain(query, token, stages, on_stage).await
    }

    async fn run_chain(
        &self,
        query: Query,
        token: CancellationToken,
        stages: Vec<StageSpec>,
        on_stage: Option<StageObserver<'_>>,
    ) -> Outcome {
        let attempt = PipelineAttempt::begin();
        notify(on_stage, Stage::Init);

        // Honor a token cancelled before the attempt even started.
        if token.is_cancelled() {
            debug!(attempt = %attempt.id, "attempt cancelled before start");
            return Outcome::Cancelled;
        }

        let mut attempted = Vec::with_capacity(stages.len());
        for spec in &stages {
            if token.is_cancelled() {
                debug!(attempt = %attempt.id, "attempt cancelled between stages");
                return Outcome::Cancelled;
            }
            notify(on_stage, spec.stage);
            attempted.push(spec.stage);

            match spec.backend.call(&query, &token).await {
                BackendResult::Success(payload) => {
                    if spec.persist {
                        if let Some(key) = query.key() {
                            notify(on_stage, Stage::Persisting);
                            self.persist_detached(key, &payload, spec.source);
                        }
                    }
                    info!(
                        attempt = %attempt.id,
                        stage = %spec.stage,
                        source = %spec.source,
                        elapsed_ms = attempt.started.elapsed().as_millis() as u64,
                        "query resolved"
                    );
                    notify(on_stage, Stage::Done);
                    return Outcome::Resolved {
                        payload,
                        source: spec.source,
                    };
                }
                BackendResult::Cancelled => {
                    debug!(attempt = %attempt.id, stage = %spec.stage, "attempt cancelled");
                    return Outcome::Cancelled;
                }
                // Miss and Failed fall through to the next stage identically;
                // they are logged apart for diagnostics.
                BackendResult::Miss => {
                    debug!(
                        attempt = %attempt.id,
                        stage = %spec.stage,
                        backend = spec.backend.name(),
                        "stage miss, falling back"
                    );
                }
                BackendResult::Failed(reason) => {
                    warn!(
                        attempt = %attempt.id,
                        stage = %spec.stage,
                        backend = spec.backend.name(),
                        %reason,
                        "stage failed, falling back"
                    );
                }
            }
        }

        info!(
            attempt = %attempt.id,
            stages = attempted.len(),
            elapsed_ms = attempt.started.elapsed().as_millis() as u64,
            "all stages exhausted"
        );
        Outcome::NotFound { attempted }
    }

    /// Fire-and-forget cache write. The outcome is already decided when this
    /// is scheduled; a persist failure is logged inside the store and never
    /// surfaces.
    fn persist_detached(&self, key: &str, payload: &serde_json::Value, source: SourceLabel) {
        let cache = self.cache.clone();
        let key = key.to_string();
        let payload = payload.clone();
        tokio::spawn(async move {
            cache.put(&key, payload, source).await;
        });
    }
}

fn notify(on_stage: Option<StageObserver<'_>>, stage: Stage) {
    if let Some(observer) = on_stage {
        observer(stage);
    }
}
