//! End-to-end pipeline tests with fixture adapters and a fixture ontology.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thedal_core::engine::RetrievalEngine;
use thedal_core::error::EngineError;
use thedal_core::providers::{FetchOptions, ProviderAdapter};
use thedal_core::types::{
    Candidate, CanonicalInfo, ContentType, ProviderKind, RawResult, RelatedTerm, RetrievalRequest,
    SourceInfo, TrustTier,
};
use thedal_core::{BreakerState, EngineConfig, Ontology};

#[derive(Clone)]
enum Behavior {
    Return(Vec<RawResult>),
    Fail,
    Delay(Duration, Vec<RawResult>),
    Panic,
}

struct FixtureAdapter {
    kind: ProviderKind,
    behavior: Mutex<Behavior>,
    calls: AtomicU64,
    last_query: Mutex<Option<String>>,
}

impl FixtureAdapter {
    fn new(kind: ProviderKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior: Mutex::new(behavior),
            calls: AtomicU64::new(0),
            last_query: Mutex::new(None),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for FixtureAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch(
        &self,
        query: &str,
        _opts: &FetchOptions,
        _timeout: Duration,
    ) -> Result<Vec<RawResult>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.to_string());
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Return(results) => Ok(results),
            Behavior::Fail => Err(EngineError::provider(self.kind, "backend unavailable")),
            Behavior::Delay(delay, results) => {
                tokio::time::sleep(delay).await;
                Ok(results)
            }
            Behavior::Panic => panic!("backend misbehaved"),
        }
    }
}

#[derive(Default)]
struct FixtureOntology {
    concepts: HashMap<String, CanonicalInfo>,
    synonyms: HashMap<String, Vec<String>>,
    related: HashMap<String, Vec<RelatedTerm>>,
}

#[async_trait]
impl Ontology for FixtureOntology {
    async fn resolve_term(&self, text: &str) -> Result<Option<CanonicalInfo>, EngineError> {
        Ok(self.concepts.get(&text.to_lowercase()).cloned())
    }

    async fn synonyms(&self, concept_id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.synonyms.get(concept_id).cloned().unwrap_or_default())
    }

    async fn related(&self, concept_id: &str) -> Result<Vec<RelatedTerm>, EngineError> {
        Ok(self.related.get(concept_id).cloned().unwrap_or_default())
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.providers.web.trust_tier = TrustTier::Medium;
    config.providers.kb.trust_tier = TrustTier::High;
    config.providers.media.trust_tier = TrustTier::High;
    config
}

/// Ontology whose every lookup takes a fixed time and resolves nothing.
struct SlowOntology {
    delay: Duration,
}

#[async_trait]
impl Ontology for SlowOntology {
    async fn resolve_term(&self, _text: &str) -> Result<Option<CanonicalInfo>, EngineError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn synonyms(&self, _concept_id: &str) -> Result<Vec<String>, EngineError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn related(&self, _concept_id: &str) -> Result<Vec<RelatedTerm>, EngineError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

fn engine_with(
    config: EngineConfig,
    adapters: Vec<Arc<FixtureAdapter>>,
    ontology: impl Ontology + 'static,
) -> RetrievalEngine {
    let table: HashMap<ProviderKind, Arc<dyn ProviderAdapter>> = adapters
        .into_iter()
        .map(|adapter| (adapter.kind(), adapter as Arc<dyn ProviderAdapter>))
        .collect();
    RetrievalEngine::with_parts(config, table, Arc::new(ontology))
}

fn movie(title: &str, url: &str, relevance: f64) -> RawResult {
    RawResult::new(title, ContentType::Movie)
        .with_url(url)
        .with_relevance(relevance)
}

#[tokio::test]
async fn merges_same_item_across_providers() {
    let web = FixtureAdapter::new(
        ProviderKind::Web,
        Behavior::Return(vec![movie(
            "The Matrix (1999)",
            "https://example.com/matrix",
            0.8,
        )]),
    );
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![movie(
            "Matrix (1999)",
            "https://www.example.com/matrix/",
            0.9,
        )]),
    );
    let engine = engine_with(
        config(),
        vec![Arc::clone(&web), Arc::clone(&media)],
        FixtureOntology::default(),
    );

    let mut request = RetrievalRequest::new("matrix cast");
    request.providers = vec![ProviderKind::Web, ProviderKind::Media];
    request.limit = 5;
    request.enable_cache = false;

    let response = engine.retrieve(request).await.unwrap();

    assert_eq!(response.results.len(), 1);
    let merged = &response.results[0];
    // The higher-trust provider is the representative.
    assert_eq!(merged.source.provider, ProviderKind::Media);
    assert_eq!(merged.rank, Some(1));
    assert!(merged.provenance.contains(&ProviderKind::Web));
    assert!(merged.provenance.contains(&ProviderKind::Media));

    // Both providers were called and traced with their raw counts.
    assert_eq!(response.providers.len(), 2);
    assert!(response.providers.iter().all(|t| t.items == 1));
}

#[tokio::test]
async fn dedupe_disabled_keeps_every_candidate() {
    let web = FixtureAdapter::new(
        ProviderKind::Web,
        Behavior::Return(vec![movie("The Matrix", "https://example.com/matrix", 0.8)]),
    );
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![movie("The Matrix", "https://example.com/matrix", 0.9)]),
    );
    let engine = engine_with(config(), vec![web, media], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.dedupe = false;
    request.enable_cache = false;

    let response = engine.retrieve(request).await.unwrap();
    assert_eq!(response.results.len(), 2);
}

#[tokio::test]
async fn all_failing_providers_yield_empty_results_not_error() {
    let mut config = config();
    config.breaker.failure_threshold = 1;
    config.breaker.reset_ms = 60_000;

    let web = FixtureAdapter::new(ProviderKind::Web, Behavior::Fail);
    let media = FixtureAdapter::new(ProviderKind::Media, Behavior::Fail);
    let engine = engine_with(
        config,
        vec![Arc::clone(&web), Arc::clone(&media)],
        FixtureOntology::default(),
    );

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Web, ProviderKind::Media];
    request.enable_cache = false;

    // First call: providers are tried, fail, and are traced with zero items.
    let first = engine.retrieve(request.clone()).await.unwrap();
    assert!(first.results.is_empty());
    assert_eq!(first.providers.len(), 2);
    assert!(first.providers.iter().all(|t| t.items == 0));

    // Every breaker opened on its single allowed failure.
    assert_eq!(engine.breakers().state(ProviderKind::Web), BreakerState::Open);
    assert_eq!(engine.breakers().state(ProviderKind::Media), BreakerState::Open);

    // Second call: open providers are never called and never traced.
    let second = engine.retrieve(request).await.unwrap();
    assert!(second.results.is_empty());
    assert!(second.providers.is_empty());
    assert_eq!(web.calls(), 1);
    assert_eq!(media.calls(), 1);
}

#[tokio::test]
async fn partial_failure_is_not_an_error() {
    let mut config = config();
    config.breaker.failure_threshold = 1;

    let web = FixtureAdapter::new(ProviderKind::Web, Behavior::Fail);
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![movie("The Matrix", "https://example.com/matrix", 0.9)]),
    );
    let engine = engine_with(config, vec![web, media], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.enable_cache = false;

    let response = engine.retrieve(request).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.providers.len(), 2);

    let web_trace = response
        .providers
        .iter()
        .find(|t| t.provider == ProviderKind::Web)
        .unwrap();
    assert_eq!(web_trace.items, 0);
}

#[tokio::test]
async fn slow_provider_times_out_and_counts_as_failure() {
    let mut config = config();
    config.providers.media.timeout_ms = 50;
    config.breaker.failure_threshold = 1;

    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Delay(
            Duration::from_millis(500),
            vec![movie("The Matrix", "https://example.com/matrix", 0.9)],
        ),
    );
    let engine = engine_with(config, vec![media], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Media];
    request.enable_cache = false;

    let started = std::time::Instant::now();
    let response = engine.retrieve(request).await.unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.providers.len(), 1);
    assert_eq!(response.providers[0].items, 0);
    // The deadline bounded the call; the 500ms sleep never ran to completion.
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(
        engine.breakers().state(ProviderKind::Media),
        BreakerState::Open
    );
}

#[tokio::test]
async fn cache_hit_short_circuits_and_counts() {
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![
            movie("The Matrix", "https://example.com/matrix", 0.9),
            movie("The Matrix Reloaded", "https://example.com/reloaded", 0.7),
        ]),
    );
    let engine = engine_with(
        config(),
        vec![Arc::clone(&media)],
        FixtureOntology::default(),
    );

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Media];

    let first = engine.retrieve(request.clone()).await.unwrap();
    let second = engine.retrieve(request).await.unwrap();

    assert_eq!(media.calls(), 1);
    assert_eq!(second.metrics.requests, 2);
    assert_eq!(second.metrics.cache_hits, 1);
    assert_eq!(second.request_id, first.request_id);

    let first_ids: Vec<&str> = first.results.iter().map(|c| c.candidate_id.as_str()).collect();
    let second_ids: Vec<&str> = second.results.iter().map(|c| c.candidate_id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn cache_disabled_bypasses_read_and_write() {
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![movie("The Matrix", "https://example.com/matrix", 0.9)]),
    );
    let engine = engine_with(
        config(),
        vec![Arc::clone(&media)],
        FixtureOntology::default(),
    );

    let mut request = RetrievalRequest::new("matrix");
    request.enable_cache = false;

    engine.retrieve(request.clone()).await.unwrap();
    let second = engine.retrieve(request).await.unwrap();

    assert_eq!(media.calls(), 2);
    assert_eq!(second.metrics.cache_hits, 0);
}

#[tokio::test]
async fn limit_truncates_after_ranking() {
    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![
            movie("A", "https://example.com/a", 0.2),
            movie("B", "https://example.com/b", 0.9),
            movie("C", "https://example.com/c", 0.5),
        ]),
    );
    let engine = engine_with(config(), vec![media], FixtureOntology::default());

    let mut request = RetrievalRequest::new("letters");
    request.limit = 2;
    request.enable_cache = false;

    let response = engine.retrieve(request).await.unwrap();
    assert_eq!(response.results.len(), 2);
    // Highest scores survive the cut, in rank order.
    assert_eq!(response.results[0].title, "B");
    assert_eq!(response.results[1].title, "C");
    assert_eq!(response.results[0].rank, Some(1));
    assert_eq!(response.results[1].rank, Some(2));
}

#[tokio::test]
async fn canonical_match_boosts_and_explains() {
    let mut ontology = FixtureOntology::default();
    ontology.concepts.insert(
        "the matrix".to_string(),
        CanonicalInfo {
            concept_id: "c:matrix".into(),
            preferred_term: "The Matrix".into(),
            confidence: 0.9,
        },
    );
    ontology.synonyms.insert(
        "c:matrix".to_string(),
        vec!["Matrix".to_string(), "La Matrice".to_string()],
    );
    ontology.related.insert(
        "c:matrix".to_string(),
        vec![RelatedTerm {
            term: "Keanu Reeves".into(),
            kind: "actor".into(),
            weight: 0.9,
        }],
    );

    let media = FixtureAdapter::new(
        ProviderKind::Media,
        Behavior::Return(vec![
            movie("The Matrix", "https://example.com/matrix", 0.5),
            movie("Unrelated Film", "https://example.com/other", 0.5),
        ]),
    );
    let engine = engine_with(config(), vec![media], ontology);

    let mut request = RetrievalRequest::new("matrix");
    request.explain = true;
    request.enable_cache = false;

    let response = engine.retrieve(request).await.unwrap();
    assert_eq!(response.results.len(), 2);

    let matched = &response.results[0];
    assert_eq!(matched.title, "The Matrix");
    assert_eq!(
        matched.canonical.as_ref().unwrap().concept_id,
        "c:matrix"
    );
    assert_eq!(matched.enrichment.as_ref().unwrap().synonyms.len(), 2);

    let explanation = matched.explanation.as_ref().unwrap();
    assert!(explanation.breakdown["canonicalBoost"] > 0.0);
    let recomputed = explanation.breakdown["baseScore"] * explanation.breakdown["providerWeight"]
        + explanation.breakdown["canonicalBoost"]
        + explanation.breakdown["relatedBoost"];
    assert!((recomputed - explanation.total_score).abs() < 1e-12);

    // The unmatched candidate passed through without canonical data.
    assert!(response.results[1].canonical.is_none());
}

#[tokio::test]
async fn expand_forwards_expanded_query_to_providers() {
    let mut ontology = FixtureOntology::default();
    ontology.concepts.insert(
        "matrix".to_string(),
        CanonicalInfo {
            concept_id: "c:matrix".into(),
            preferred_term: "The Matrix".into(),
            confidence: 0.8,
        },
    );

    let media = FixtureAdapter::new(ProviderKind::Media, Behavior::Return(Vec::new()));
    let engine = engine_with(config(), vec![Arc::clone(&media)], ontology);

    let mut request = RetrievalRequest::new("matrix");
    request.expand = true;
    request.enable_cache = false;

    engine.retrieve(request).await.unwrap();
    assert_eq!(media.last_query().as_deref(), Some("matrix The Matrix"));
}

#[tokio::test]
async fn standalone_enrich_preserves_identity_fields() {
    let mut ontology = FixtureOntology::default();
    ontology.concepts.insert(
        "the matrix".to_string(),
        CanonicalInfo {
            concept_id: "c:matrix".into(),
            preferred_term: "The Matrix".into(),
            confidence: 0.9,
        },
    );
    ontology
        .synonyms
        .insert("c:matrix".to_string(), vec!["Matrix".to_string()]);

    let engine = engine_with(config(), Vec::new(), ontology);

    let candidate = Candidate::from_raw(
        movie("The Matrix", "https://example.com/matrix", 0.9),
        SourceInfo {
            provider: ProviderKind::Media,
            trust_tier: TrustTier::High,
        },
    );
    let original_id = candidate.candidate_id.clone();

    let enriched = engine.enrich_candidates(vec![candidate]).await;
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].candidate_id, original_id);
    assert_eq!(enriched[0].title, "The Matrix");
    assert_eq!(enriched[0].url.as_deref(), Some("https://example.com/matrix"));
    assert!(enriched[0].canonical.is_some());
    assert!(enriched[0].enrichment.is_some());
}

#[tokio::test]
async fn standalone_explain_matches_standalone_rank() {
    let engine = engine_with(config(), Vec::new(), FixtureOntology::default());

    let candidate = Candidate::from_raw(
        movie("The Matrix", "https://example.com/matrix", 0.7),
        SourceInfo {
            provider: ProviderKind::Web,
            trust_tier: TrustTier::Medium,
        },
    );

    let explanation = engine.explain_one(&candidate);
    let ranked = engine.rank_standalone(vec![candidate], false);
    assert_eq!(ranked[0].rank_score, Some(explanation.total_score));
}

#[tokio::test]
async fn half_open_probe_recovers_provider() {
    let mut config = config();
    config.breaker.failure_threshold = 1;
    config.breaker.success_threshold = 1;
    config.breaker.reset_ms = 0;

    let media = FixtureAdapter::new(ProviderKind::Media, Behavior::Fail);
    let engine = engine_with(config, vec![Arc::clone(&media)], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Media];
    request.enable_cache = false;

    engine.retrieve(request.clone()).await.unwrap();
    assert_eq!(
        engine.breakers().state(ProviderKind::Media),
        BreakerState::Open
    );

    // Backend recovers; the cooldown (0ms) has elapsed, so the next
    // request is the single half-open probe and closes the breaker.
    *media.behavior.lock().unwrap() =
        Behavior::Return(vec![movie("The Matrix", "https://example.com/matrix", 0.9)]);

    let response = engine.retrieve(request).await.unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(
        engine.breakers().state(ProviderKind::Media),
        BreakerState::Closed
    );
}

#[tokio::test]
async fn slow_ontology_does_not_extend_past_request_budget() {
    let films: Vec<RawResult> = (0..10)
        .map(|i| {
            movie(
                &format!("Film {i}"),
                &format!("https://example.com/film-{i}"),
                0.5,
            )
        })
        .collect();
    let media = FixtureAdapter::new(ProviderKind::Media, Behavior::Return(films));
    let engine = engine_with(
        config(),
        vec![media],
        SlowOntology {
            delay: Duration::from_millis(200),
        },
    );

    let mut request = RetrievalRequest::new("film");
    request.providers = vec![ProviderKind::Media];
    request.timeout_ms = Some(150);
    request.enable_cache = false;

    let started = std::time::Instant::now();
    let response = engine.retrieve(request).await.unwrap();

    // Ten sequential 200ms lookups would take seconds; the deadline cut
    // them off and the candidates passed through unenriched.
    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert_eq!(response.results.len(), 10);
    assert!(response.results.iter().all(|c| c.canonical.is_none()));
    assert!(response.results.iter().all(|c| c.rank.is_some()));
}

#[tokio::test]
async fn panicking_provider_counts_as_breaker_failure() {
    let mut config = config();
    config.breaker.failure_threshold = 1;
    config.breaker.reset_ms = 0;

    let media = FixtureAdapter::new(ProviderKind::Media, Behavior::Panic);
    let engine = engine_with(config, vec![Arc::clone(&media)], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Media];
    request.enable_cache = false;

    let first = engine.retrieve(request.clone()).await.unwrap();
    assert!(first.results.is_empty());
    assert_eq!(
        engine.breakers().state(ProviderKind::Media),
        BreakerState::Open
    );

    // The cooldown (0ms) has elapsed, so the next request is the single
    // half-open probe. It panics too; the breaker must re-open rather
    // than stay stuck half-open with a dangling probe slot.
    engine.retrieve(request.clone()).await.unwrap();
    assert_eq!(media.calls(), 2);
    assert_eq!(
        engine.breakers().state(ProviderKind::Media),
        BreakerState::Open
    );

    // And the probe slot is free again for the next attempt.
    engine.retrieve(request).await.unwrap();
    assert_eq!(media.calls(), 3);
}

#[tokio::test]
async fn validation_errors_surface_synchronously() {
    let engine = engine_with(config(), Vec::new(), FixtureOntology::default());

    assert!(engine.retrieve(RetrievalRequest::new("")).await.is_err());

    let mut zero_limit = RetrievalRequest::new("ok");
    zero_limit.limit = 0;
    assert!(engine.retrieve(zero_limit).await.is_err());
}

#[tokio::test]
async fn status_reports_breaker_and_latency() {
    let mut config = config();
    config.breaker.failure_threshold = 1;

    let web = FixtureAdapter::new(ProviderKind::Web, Behavior::Fail);
    let engine = engine_with(config, vec![web], FixtureOntology::default());

    let mut request = RetrievalRequest::new("matrix");
    request.providers = vec![ProviderKind::Web];
    request.enable_cache = false;
    engine.retrieve(request).await.unwrap();

    let status = engine.provider_status();
    assert_eq!(status.len(), ProviderKind::ALL.len());
    let web_status = status
        .iter()
        .find(|s| s.provider == ProviderKind::Web)
        .unwrap();
    assert_eq!(web_status.state, BreakerState::Open);

    let snapshot = engine.metrics_snapshot();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.providers["web"].calls, 1);
}
