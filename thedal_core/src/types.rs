//! Wire and domain types for the retrieval pipeline.
//!
//! All request/response types serialize as camelCase JSON, matching the
//! HTTP surface exposed by `thedal_server`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EngineError;

/// Default number of results returned per request.
pub const DEFAULT_LIMIT: usize = 20;

/// Default per-provider timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default global timeout in milliseconds.
pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 30_000;

/// The retrieval backends known at compile time.
///
/// Provider dispatch is a closed enum rather than runtime strings so an
/// unregistered provider is a deserialization failure, not a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// General web search backend.
    Web,
    /// Local knowledge-base backend (full-text/vector document search).
    #[serde(rename = "kb")]
    KnowledgeBase,
    /// Domain-specific media catalog backend.
    Media,
}

impl ProviderKind {
    /// Every provider kind, in registry order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Web,
        ProviderKind::KnowledgeBase,
        ProviderKind::Media,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Web => "web",
            ProviderKind::KnowledgeBase => "kb",
            ProviderKind::Media => "media",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static per-provider weight applied during ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Low,
    Medium,
    High,
}

impl TrustTier {
    /// Multiplier applied to the provider-reported base score.
    pub fn weight(&self) -> f64 {
        match self {
            TrustTier::Low => 0.6,
            TrustTier::Medium => 0.8,
            TrustTier::High => 1.0,
        }
    }
}

/// Content-type filter values understood by the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Tv,
    Podcast,
    Kb,
    Article,
    #[serde(other)]
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
            ContentType::Podcast => "podcast",
            ContentType::Kb => "kb",
            ContentType::Article => "article",
            ContentType::Unknown => "unknown",
        }
    }
}

/// Retrieval mode forwarded to providers that distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

/// A single logical query issued against the federated provider set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalRequest {
    /// Query text. Must be non-empty.
    pub query: String,

    /// Maximum results in the final response (default: 20).
    pub limit: usize,

    /// Providers to query. Empty means "all enabled".
    pub providers: Vec<ProviderKind>,

    /// Optional content-type filter forwarded to providers.
    pub types: Vec<ContentType>,

    /// Retrieval mode (default: hybrid).
    pub mode: SearchMode,

    /// Expand the query against the ontology before fan-out.
    pub expand: bool,

    /// Attach a per-result scoring breakdown.
    pub explain: bool,

    /// Read/write the result cache for this request.
    pub enable_cache: bool,

    /// Merge candidates that represent the same item (default: true).
    pub dedupe: bool,

    /// Overall time budget in milliseconds. Default applies if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: DEFAULT_LIMIT,
            providers: Vec::new(),
            types: Vec::new(),
            mode: SearchMode::default(),
            expand: false,
            explain: false,
            enable_cache: true,
            dedupe: true,
            timeout_ms: None,
        }
    }
}

impl RetrievalRequest {
    /// Build a request with defaults for everything but the query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Reject malformed requests before any provider work happens.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.query.trim().is_empty() {
            return Err(EngineError::Validation("query must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(EngineError::Validation("limit must be positive".into()));
        }
        if let Some(ms) = self.timeout_ms {
            if ms == 0 {
                return Err(EngineError::Validation("timeoutMs must be positive".into()));
            }
        }
        Ok(())
    }

    /// Overall time budget for this request.
    pub fn overall_timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(DEFAULT_GLOBAL_TIMEOUT_MS)
    }
}

/// A raw, provider-shaped result before merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    pub content_type: ContentType,

    /// Provider-reported relevance in [0, 1], when the backend exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,

    /// Backend-specific fields that do not map onto the common schema.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl RawResult {
    pub fn new(title: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            title: title.into(),
            url: None,
            snippet: None,
            content_type,
            relevance: None,
            metadata: Value::Null,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Identity of the provider that contributed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub provider: ProviderKind,
    pub trust_tier: TrustTier,
}

/// Ontology concept a candidate resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInfo {
    pub concept_id: String,
    pub preferred_term: String,
    /// Match strength in [0, 1]; exact > alias > fuzzy.
    pub confidence: f64,
}

/// A related-term edge from the ontology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedTerm {
    pub term: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Edge weight in [0, 1].
    pub weight: f64,
}

/// Synonyms and related terms attached by the enricher.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedTerm>,

    /// Aggregate confidence of the lookup that produced this enrichment.
    pub confidence: f64,
}

/// Reproducible scoring breakdown for one candidate.
///
/// Every additive/multiplicative term that produced `total_score` appears
/// by name in `breakdown`, so the score can be recomputed from the
/// breakdown alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub total_score: f64,
    pub breakdown: BTreeMap<String, f64>,
}

/// A normalized search result, before or after merge/enrichment/ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Stable identifier, generated if the provider did not supply one.
    pub candidate_id: String,

    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Scheme/host/path-normalized URL, used as the primary dedupe key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    pub content_type: ContentType,

    /// The representative provider for this candidate.
    pub source: SourceInfo,

    /// Every provider that contributed a matching raw result, the
    /// representative included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<ProviderKind>,

    /// Provider-reported relevance carried through from the raw result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<CanonicalInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,

    /// 1-based position after ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl Candidate {
    /// Build a candidate from a raw provider result.
    pub fn from_raw(raw: RawResult, source: SourceInfo) -> Self {
        let normalized_url = raw.url.as_deref().and_then(crate::dedupe::normalize_url);
        Self {
            candidate_id: uuid::Uuid::new_v4().to_string(),
            title: raw.title,
            url: raw.url,
            normalized_url,
            snippet: raw.snippet,
            content_type: raw.content_type,
            source,
            provenance: vec![source.provider],
            relevance: raw.relevance,
            canonical: None,
            enrichment: None,
            rank: None,
            rank_score: None,
            explanation: None,
        }
    }
}

/// Per-provider diagnostic trace for one request.
///
/// Providers whose breaker was open never appear here; they were not called.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTrace {
    pub provider: ProviderKind,
    pub elapsed_ms: u64,
    /// Raw pre-merge result count; zero for failures and timeouts.
    pub items: usize,
}

/// Process counters echoed into each response.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetrics {
    pub requests: u64,
    pub cache_hits: u64,
}

/// The merged, ranked answer to one retrieval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResponse {
    /// Unique per call; later feedback correlates against it.
    pub request_id: String,

    pub query: String,

    pub results: Vec<Candidate>,

    pub providers: Vec<ProviderTrace>,

    pub metrics: ResponseMetrics,
}

/// Explicit relevance judgement on a feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
    Neutral,
}

/// One append-only feedback record, created once and never mutated.
///
/// Exactly one of `feedback` and `action` must be present. No referential
/// integrity is enforced against past results; a late or replayed
/// `candidate_id` is accepted as long as it is well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub candidate_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackKind>,

    /// Implicit action such as "click" or "dismiss".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Optional 1-5 rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for FeedbackEvent {
    fn default() -> Self {
        Self {
            id: None,
            request_id: None,
            candidate_id: String::new(),
            provider: None,
            feedback: None,
            action: None,
            rating: None,
            notes: None,
            metadata: Value::Null,
            created_at: None,
        }
    }
}

impl FeedbackEvent {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.candidate_id.trim().is_empty() {
            return Err(EngineError::Validation("candidateId must not be empty".into()));
        }
        match (&self.feedback, &self.action) {
            (None, None) => Err(EngineError::Validation(
                "one of feedback or action is required".into(),
            )),
            (Some(_), Some(_)) => Err(EngineError::Validation(
                "feedback and action are mutually exclusive".into(),
            )),
            _ => {
                if let Some(rating) = self.rating {
                    if !(1..=5).contains(&rating) {
                        return Err(EngineError::Validation("rating must be 1-5".into()));
                    }
                }
                Ok(())
            }
        }
    }
}

/// Receipt returned by the feedback store after an append.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReceipt {
    pub id: String,
    pub created_at: DateTime<Utc>,
}
