//! Retrieval orchestrator.
//!
//! Owns the end-to-end request lifecycle: cache lookup, breaker-filtered
//! provider fan-out with per-provider deadlines, merge, canonicalize,
//! enrich, rank, cache write-through. Provider failures are contained
//! here; the only caller-visible error is request validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::breaker::{BreakerRegistry, BreakerState};
use crate::cache::{fingerprint, ResponseCache};
use crate::config::EngineConfig;
use crate::dedupe::dedupe_candidates;
use crate::error::EngineError;
use crate::feedback::FeedbackStore;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ontology::{canonicalize, enrich, HttpOntology, Ontology};
use crate::providers::{build_adapters, FetchOptions, ProviderAdapter};
use crate::rank::{explain_candidate, rank_candidates};
use crate::types::{
    Candidate, Explanation, FeedbackEvent, FeedbackReceipt, ProviderKind, ProviderTrace,
    RawResult, RetrievalRequest, RetrievalResponse, SourceInfo,
};

/// Per-provider breaker state and last-seen latency, for `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub state: BreakerState,
    pub last_latency_ms: u64,
}

pub struct RetrievalEngine {
    config: EngineConfig,
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    breakers: Arc<BreakerRegistry>,
    cache: ResponseCache,
    ontology: Arc<dyn Ontology>,
    metrics: Arc<Metrics>,
    feedback: Arc<FeedbackStore>,
}

impl RetrievalEngine {
    /// Build an engine with real HTTP adapters and ontology client.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let adapters = build_adapters(&config)?;
        let ontology: Arc<dyn Ontology> = Arc::new(HttpOntology::new(&config.ontology)?);
        Ok(Self::with_parts(config, adapters, ontology))
    }

    /// Build an engine around caller-supplied adapters and ontology.
    ///
    /// This is the seam tests (and embedders) use to swap the network
    /// edges for fixtures.
    pub fn with_parts(
        config: EngineConfig,
        adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
        ontology: Arc<dyn Ontology>,
    ) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(config.breaker));
        let cache = ResponseCache::new(config.cache_ttl_ms);
        let feedback = Arc::new(FeedbackStore::new(config.feedback_path.clone()));
        Self {
            config,
            adapters,
            breakers,
            cache,
            ontology,
            metrics: Arc::new(Metrics::new()),
            feedback,
        }
    }

    /// Execute one retrieval request end to end.
    pub async fn retrieve(
        &self,
        request: RetrievalRequest,
    ) -> Result<RetrievalResponse, EngineError> {
        request.validate()?;
        self.metrics.record_request();
        let started = Instant::now();

        let cache_key = fingerprint(&request);
        if request.enable_cache {
            if let Some(mut cached) = self.cache.get(&cache_key) {
                self.metrics.record_cache_hit();
                debug!(query = %request.query, "cache hit");
                cached.metrics = self.metrics.response_metrics();
                return Ok(cached);
            }
        }

        let query = if request.expand {
            self.expand_query(&request.query).await
        } else {
            request.query.clone()
        };

        let (raw_by_provider, traces) = self.fan_out(&request, &query).await;

        let mut candidates: Vec<Candidate> = Vec::new();
        for (kind, results) in raw_by_provider {
            let trust_tier = self.config.provider(kind).trust_tier;
            let source = SourceInfo {
                provider: kind,
                trust_tier,
            };
            candidates.extend(results.into_iter().map(|raw| Candidate::from_raw(raw, source)));
        }

        if request.dedupe {
            candidates = dedupe_candidates(candidates);
        }

        // The ontology stages get whatever is left of the request budget.
        // On expiry the remaining candidates pass through unenriched.
        let remaining = Duration::from_millis(request.overall_timeout_ms())
            .saturating_sub(started.elapsed());
        let ontology_pass = async {
            canonicalize(self.ontology.as_ref(), &mut candidates).await;
            enrich(self.ontology.as_ref(), &mut candidates).await;
        };
        if timeout(remaining, ontology_pass).await.is_err() {
            warn!(query = %request.query, "ontology stages cut off at the request deadline");
        }

        rank_candidates(&mut candidates, Some(&request.query), request.explain);
        candidates.truncate(request.limit);

        let response = RetrievalResponse {
            request_id: uuid::Uuid::new_v4().to_string(),
            query: request.query.clone(),
            results: candidates,
            providers: traces,
            metrics: self.metrics.response_metrics(),
        };

        if request.enable_cache {
            self.cache.put(cache_key, response.clone());
        }

        Ok(response)
    }

    /// Breaker-filtered parallel fan-out.
    ///
    /// Each effective provider runs in its own task, bounded by the
    /// smaller of the request budget and its configured timeout. The
    /// breaker report fires inside the task, on the call's own completion
    /// path, so a response assembled at the deadline is never reopened.
    async fn fan_out(
        &self,
        request: &RetrievalRequest,
        query: &str,
    ) -> (Vec<(ProviderKind, Vec<RawResult>)>, Vec<ProviderTrace>) {
        let requested: Vec<ProviderKind> = if request.providers.is_empty() {
            ProviderKind::ALL.to_vec()
        } else {
            request.providers.clone()
        };

        // requested ∩ enabled ∩ breaker-permitted. Skipped providers are
        // omitted from the trace entirely; they were never called.
        let effective: Vec<ProviderKind> = ProviderKind::ALL
            .iter()
            .copied()
            .filter(|kind| requested.contains(kind))
            .filter(|kind| self.adapters.contains_key(kind))
            .filter(|kind| self.breakers.try_acquire(*kind))
            .collect();

        let opts = FetchOptions {
            limit: request.limit,
            mode: request.mode,
            types: request.types.clone(),
        };
        let overall_ms = request.overall_timeout_ms();

        let handles: Vec<_> = effective
            .iter()
            .map(|kind| {
                let kind = *kind;
                let adapter = Arc::clone(&self.adapters[&kind]);
                let breakers = Arc::clone(&self.breakers);
                let metrics = Arc::clone(&self.metrics);
                let query = query.to_string();
                let opts = opts.clone();
                let budget_ms = overall_ms.min(self.config.provider(kind).timeout_ms);

                tokio::spawn(async move {
                    let start = Instant::now();
                    let fetched = timeout(
                        Duration::from_millis(budget_ms),
                        adapter.fetch(&query, &opts, Duration::from_millis(budget_ms)),
                    )
                    .await;
                    let elapsed = start.elapsed();
                    metrics.record_provider_call(kind, elapsed);

                    let outcome = match fetched {
                        Ok(Ok(results)) => {
                            breakers.on_success(kind);
                            Ok(results)
                        }
                        Ok(Err(err)) => {
                            breakers.on_failure(kind);
                            Err(err)
                        }
                        Err(_) => {
                            breakers.on_failure(kind);
                            Err(EngineError::Timeout(budget_ms))
                        }
                    };

                    (kind, elapsed, outcome)
                })
            })
            .collect();

        let mut raw_by_provider = Vec::with_capacity(handles.len());
        let mut traces = Vec::with_capacity(handles.len());

        for (spawned, handle) in effective.into_iter().zip(futures::future::join_all(handles).await)
        {
            match handle {
                Ok((kind, elapsed, Ok(results))) => {
                    traces.push(ProviderTrace {
                        provider: kind,
                        elapsed_ms: elapsed.as_millis() as u64,
                        items: results.len(),
                    });
                    raw_by_provider.push((kind, results));
                }
                Ok((kind, elapsed, Err(err))) => {
                    warn!(provider = %kind, error = %err, "provider fetch failed");
                    traces.push(ProviderTrace {
                        provider: kind,
                        elapsed_ms: elapsed.as_millis() as u64,
                        items: 0,
                    });
                }
                Err(join_err) => {
                    // The task died before its own breaker report could run;
                    // count the failure here so the breaker (and any half-open
                    // probe slot) is not left dangling.
                    warn!(provider = %spawned, error = %join_err, "provider task aborted");
                    self.breakers.on_failure(spawned);
                }
            }
        }

        (raw_by_provider, traces)
    }

    /// Best-effort ontology query expansion ahead of fan-out.
    async fn expand_query(&self, query: &str) -> String {
        match self.ontology.resolve_term(query).await {
            Ok(Some(resolution))
                if !resolution.preferred_term.eq_ignore_ascii_case(query) =>
            {
                debug!(query, preferred = %resolution.preferred_term, "expanded query");
                format!("{query} {}", resolution.preferred_term)
            }
            Ok(_) => query.to_string(),
            Err(err) => {
                debug!(query, error = %err, "query expansion failed");
                query.to_string()
            }
        }
    }

    /// Run canonicalization + enrichment standalone, without retrieval.
    pub async fn enrich_candidates(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        canonicalize(self.ontology.as_ref(), &mut candidates).await;
        enrich(self.ontology.as_ref(), &mut candidates).await;
        candidates
    }

    /// Run the ranker standalone on caller-supplied candidates.
    pub fn rank_standalone(&self, mut candidates: Vec<Candidate>, explain: bool) -> Vec<Candidate> {
        rank_candidates(&mut candidates, None, explain);
        candidates
    }

    /// Reproduce the exact score the ranker would assign this candidate.
    pub fn explain_one(&self, candidate: &Candidate) -> Explanation {
        explain_candidate(candidate, None)
    }

    pub fn record_feedback(&self, event: FeedbackEvent) -> Result<FeedbackReceipt, EngineError> {
        self.feedback.record(event)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.breakers
            .snapshot()
            .into_iter()
            .map(|snapshot| ProviderStatus {
                provider: snapshot.provider,
                state: snapshot.state,
                last_latency_ms: self.metrics.last_latency_ms(snapshot.provider),
            })
            .collect()
    }

    pub fn feedback_store(&self) -> &FeedbackStore {
        &self.feedback
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }
}
