//! End-to-end pipeline properties over fake backends and a real cache.
//!
//! Backends are scripted in-process; no network is involved. HTTP adapter
//! mapping is covered separately in `http_adapters.rs`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use wellquery::backends::AnalysisBackend;
use wellquery::cache::{CacheStats, CacheStore, MemoryCache};
use wellquery::cancel::AttemptController;
use wellquery::models::{BackendResult, CacheEntry, Outcome, Query, SourceLabel, Stage};
use wellquery::pipeline::{PipelineBackends, PipelineOrchestrator};

/// Opt-in log output for debugging test failures (RUST_LOG=wellquery=debug).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wellquery=warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Backend returning a scripted result, counting invocations.
struct ScriptedBackend {
    name: &'static str,
    result: BackendResult,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(name: &'static str, result: BackendResult) -> Arc<Self> {
        Arc::new(Self {
            name,
            result,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn call(&self, _query: &Query, token: &CancellationToken) -> BackendResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token.is_cancelled() {
            return BackendResult::Cancelled;
        }
        self.result.clone()
    }
}

/// Backend that stays in flight until its token is cancelled, simulating a
/// network call aborted mid-request.
struct HangingBackend {
    calls: AtomicUsize,
}

impl HangingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisBackend for HangingBackend {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn call(&self, _query: &Query, token: &CancellationToken) -> BackendResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        token.cancelled().await;
        BackendResult::Cancelled
    }
}

/// Cache whose writes are lost, standing in for a storage layer that fails
/// and swallows the error.
struct DroppedWriteCache {
    put_attempts: AtomicUsize,
}

impl DroppedWriteCache {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            put_attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CacheStore for DroppedWriteCache {
    async fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }

    async fn put(&self, _key: &str, _payload: Value, _source: SourceLabel) {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        // Storage failure: swallowed, per the cache contract.
    }

    async fn find_similar(&self, _key: &str) -> Vec<CacheEntry> {
        Vec::new()
    }

    async fn sweep_expired(&self) {}

    async fn clear_all(&self) {}

    async fn stats(&self) -> CacheStats {
        CacheStats {
            total: 0,
            active: 0,
            expired: 0,
            oldest: None,
            newest: None,
        }
    }
}

fn miss_backend(name: &'static str) -> Arc<ScriptedBackend> {
    ScriptedBackend::new(name, BackendResult::Miss)
}

fn orchestrator(
    cache: Arc<dyn CacheStore>,
    primary: Arc<dyn AnalysisBackend>,
    similarity: Arc<dyn AnalysisBackend>,
    barcode: Arc<dyn AnalysisBackend>,
    product: Arc<dyn AnalysisBackend>,
    image: Arc<dyn AnalysisBackend>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        cache,
        PipelineBackends {
            primary,
            similarity,
            barcode,
            product,
            image,
        },
    )
}

/// Wait for a detached persist to land, bounded so a regression fails fast.
async fn wait_for_entry(cache: &MemoryCache, key: &str) -> Option<CacheEntry> {
    for _ in 0..50 {
        if let Some(entry) = cache.get(key).await {
            return Some(entry);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn test_cache_precedence_skips_primary() {
    init_tracing();
    let cache = Arc::new(MemoryCache::new());
    cache
        .put("broccoli", json!({"summary": "green"}), SourceLabel::Primary)
        .await;

    let primary = ScriptedBackend::new("primary", BackendResult::Success(json!({"fresh": true})));
    let orch = orchestrator(
        cache.clone(),
        primary.clone(),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("broccoli"), CancellationToken::new(), None)
        .await;

    match outcome {
        Outcome::Resolved { payload, source } => {
            assert_eq!(source, SourceLabel::Cache);
            assert_eq!(payload, json!({"summary": "green"}));
        }
        other => panic!("expected cache hit, got {other:?}"),
    }
    assert_eq!(primary.calls(), 0, "primary must not run on a cache hit");
}

#[tokio::test]
async fn test_expired_entry_falls_through_to_primary() {
    let cache = Arc::new(MemoryCache::with_ttl(Duration::from_millis(40)));
    cache
        .put("broccoli", json!({"summary": "stale"}), SourceLabel::Primary)
        .await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let primary = ScriptedBackend::new("primary", BackendResult::Success(json!({"summary": "new"})));
    let orch = orchestrator(
        cache.clone(),
        primary.clone(),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("broccoli"), CancellationToken::new(), None)
        .await;
    assert!(
        matches!(outcome, Outcome::Resolved { source: SourceLabel::Primary, .. }),
        "expired entry must be treated as absent"
    );
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_similarity_success_is_not_written_back() {
    let cache = Arc::new(MemoryCache::new());
    let primary = ScriptedBackend::new("primary", BackendResult::Miss);
    let similarity =
        ScriptedBackend::new("similarity", BackendResult::Success(json!({"near": "match"})));
    let orch = orchestrator(
        cache.clone(),
        primary,
        similarity,
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("kefir"), CancellationToken::new(), None)
        .await;
    match outcome {
        Outcome::Resolved { source, .. } => assert_eq!(source, SourceLabel::Similar),
        other => panic!("expected similarity hit, got {other:?}"),
    }

    // Give any (incorrect) detached write time to land before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        cache.get("kefir").await.is_none(),
        "similarity results must not be cached under the original key"
    );
}

#[tokio::test]
async fn test_cancellation_mid_primary_skips_fallback() {
    init_tracing();
    let cache = Arc::new(MemoryCache::new());
    let primary = HangingBackend::new();
    let similarity =
        ScriptedBackend::new("similarity", BackendResult::Success(json!({"near": "match"})));
    let orch = orchestrator(
        cache,
        primary,
        similarity.clone(),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let token = CancellationToken::new();
    let canceller = token.clone();
    let (outcome, _) = tokio::join!(
        orch.resolve(Query::text("test"), token, None),
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        }
    );

    assert!(matches!(outcome, Outcome::Cancelled));
    assert_eq!(
        similarity.calls(),
        0,
        "a cancelled attempt must not fall back"
    );
}

#[tokio::test]
async fn test_pre_cancelled_token_runs_no_backends() {
    let cache = Arc::new(MemoryCache::new());
    let primary = ScriptedBackend::new("primary", BackendResult::Success(json!({"x": 1})));
    let orch = orchestrator(
        cache,
        primary.clone(),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let token = CancellationToken::new();
    token.cancel();
    let outcome = orch.resolve(Query::text("test"), token, None).await;

    assert!(matches!(outcome, Outcome::Cancelled));
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_persist_failure_does_not_flip_success() {
    let cache = DroppedWriteCache::new();
    let primary =
        ScriptedBackend::new("primary", BackendResult::Success(json!({"summary": "ok"})));
    let orch = orchestrator(
        cache.clone(),
        primary,
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("test"), CancellationToken::new(), None)
        .await;
    match outcome {
        Outcome::Resolved { source, .. } => assert_eq!(source, SourceLabel::Primary),
        other => panic!("persist failure must not flip success, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.put_attempts.load(Ordering::SeqCst) >= 1);
    assert!(cache.get("test").await.is_none());
}

#[tokio::test]
async fn test_miss_and_failure_both_fall_back() {
    for primary_result in [
        BackendResult::Miss,
        BackendResult::Failed("HTTP 503".to_string()),
    ] {
        let cache = Arc::new(MemoryCache::new());
        let primary = ScriptedBackend::new("primary", primary_result);
        let similarity =
            ScriptedBackend::new("similarity", BackendResult::Success(json!({"near": 1})));
        let orch = orchestrator(
            cache,
            primary,
            similarity.clone(),
            miss_backend("barcode"),
            miss_backend("product"),
            miss_backend("image"),
        );

        let outcome = orch
            .resolve(Query::text("test"), CancellationToken::new(), None)
            .await;
        assert!(
            matches!(outcome, Outcome::Resolved { source: SourceLabel::Similar, .. }),
            "miss and failure must both advance the chain"
        );
        assert_eq!(similarity.calls(), 1);
    }
}

#[tokio::test]
async fn test_exhausted_chain_reports_attempted_stages() {
    let cache = Arc::new(MemoryCache::new());
    let orch = orchestrator(
        cache,
        ScriptedBackend::new("primary", BackendResult::Failed("down".to_string())),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("test"), CancellationToken::new(), None)
        .await;
    match outcome {
        Outcome::NotFound { attempted } => {
            assert_eq!(
                attempted,
                vec![Stage::CacheCheck, Stage::PrimaryResolve, Stage::FallbackResolve]
            );
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_query_fails_fast() {
    let cache = Arc::new(MemoryCache::new());
    let primary = ScriptedBackend::new("primary", BackendResult::Success(json!({"x": 1})));
    let orch = orchestrator(
        cache,
        primary.clone(),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("   "), CancellationToken::new(), None)
        .await;
    assert!(matches!(outcome, Outcome::Failed { .. }));
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_primary_result_is_cached_for_next_lookup() {
    let cache = Arc::new(MemoryCache::new());
    let payload = json!({"summary": "test result"});
    let primary = ScriptedBackend::new("primary", BackendResult::Success(payload.clone()));
    let orch = orchestrator(
        cache.clone(),
        primary,
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve(Query::text("test"), CancellationToken::new(), None)
        .await;
    assert!(matches!(outcome, Outcome::Resolved { source: SourceLabel::Primary, .. }));

    let entry = wait_for_entry(&cache, "test")
        .await
        .expect("primary result should be persisted");
    assert_eq!(entry.payload, payload);
    assert_eq!(entry.source, SourceLabel::Primary);
}

#[tokio::test]
async fn test_barcode_miss_does_not_chain_into_product_lookup() {
    let cache = Arc::new(MemoryCache::new());
    let barcode = miss_backend("barcode");
    let product = ScriptedBackend::new("product", BackendResult::Success(json!({"x": 1})));
    let orch = orchestrator(
        cache,
        miss_backend("primary"),
        miss_backend("similarity"),
        barcode.clone(),
        product.clone(),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve_scan(
            Query::identifier("049000028911"),
            CancellationToken::new(),
            None,
        )
        .await;

    match outcome {
        Outcome::NotFound { attempted } => {
            assert_eq!(attempted, vec![Stage::CacheCheck, Stage::BarcodeResolve]);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(barcode.calls(), 1);
    assert_eq!(
        product.calls(),
        0,
        "identifier classes are mutually exclusive, not a chain"
    );
}

#[tokio::test]
async fn test_scan_persists_under_gtin14_key() {
    let cache = Arc::new(MemoryCache::new());
    let barcode =
        ScriptedBackend::new("barcode", BackendResult::Success(json!({"product": "cola"})));
    let orch = orchestrator(
        cache.clone(),
        miss_backend("primary"),
        miss_backend("similarity"),
        barcode,
        miss_backend("product"),
        miss_backend("image"),
    );

    let outcome = orch
        .resolve_scan(
            Query::identifier("049000028911"),
            CancellationToken::new(),
            None,
        )
        .await;
    assert!(matches!(outcome, Outcome::Resolved { source: SourceLabel::Barcode, .. }));

    let entry = wait_for_entry(&cache, "00049000028911")
        .await
        .expect("barcode result should be persisted under the GTIN-14 key");
    assert_eq!(entry.source, SourceLabel::Barcode);
}

#[tokio::test]
async fn test_observer_sees_stage_sequence() {
    let cache = Arc::new(MemoryCache::new());
    let primary = ScriptedBackend::new("primary", BackendResult::Success(json!({"x": 1})));
    let orch = orchestrator(
        cache,
        primary,
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    );

    let seen: Mutex<Vec<Stage>> = Mutex::new(Vec::new());
    let observer = |stage: Stage| {
        seen.lock().unwrap().push(stage);
    };
    let outcome = orch
        .resolve(Query::text("test"), CancellationToken::new(), Some(&observer))
        .await;

    assert!(matches!(outcome, Outcome::Resolved { .. }));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Stage::Init,
            Stage::CacheCheck,
            Stage::PrimaryResolve,
            Stage::Persisting,
            Stage::Done,
        ]
    );
}

#[tokio::test]
async fn test_raw_image_upload_skips_cache_check() {
    let cache = Arc::new(MemoryCache::new());
    let image = ScriptedBackend::new("image", BackendResult::Success(json!({"verdict": "ok"})));
    let orch = orchestrator(
        cache,
        miss_backend("primary"),
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        image,
    );

    let seen: Mutex<Vec<Stage>> = Mutex::new(Vec::new());
    let observer = |stage: Stage| {
        seen.lock().unwrap().push(stage);
    };
    let outcome = orch
        .resolve_scan(
            Query::image(vec![0xff, 0xd8, 0xff], "snack.jpg"),
            CancellationToken::new(),
            Some(&observer),
        )
        .await;

    assert!(matches!(outcome, Outcome::Resolved { source: SourceLabel::Image, .. }));
    // No key: no cache check and no persist stage.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Stage::Init, Stage::ImageResolve, Stage::Done]
    );
}

#[tokio::test]
async fn test_new_attempt_supersedes_previous() {
    let cache = Arc::new(MemoryCache::new());
    let primary = HangingBackend::new();
    let orch = Arc::new(orchestrator(
        cache,
        primary,
        miss_backend("similarity"),
        miss_backend("barcode"),
        miss_backend("product"),
        miss_backend("image"),
    ));

    let controller = AttemptController::new();
    let first_token = controller.begin();

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.resolve(Query::text("first"), first_token, None).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Starting the next attempt cancels the one still in flight.
    let second_token = controller.begin();
    let first_outcome = first.await.unwrap();
    assert!(matches!(first_outcome, Outcome::Cancelled));
    assert!(!second_token.is_cancelled());
}
