// src/lib.rs
pub mod breaker;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod metrics;
pub mod ontology;
pub mod providers;
pub mod rank;
pub mod types;

pub use crate::breaker::{BreakerConfig, BreakerRegistry, BreakerState};
pub use crate::config::EngineConfig;
pub use crate::engine::{ProviderStatus, RetrievalEngine};
pub use crate::error::EngineError;
pub use crate::metrics::MetricsSnapshot;
pub use crate::ontology::{HttpOntology, Ontology};
pub use crate::providers::{FetchOptions, ProviderAdapter};
pub use crate::types::{
    Candidate, CanonicalInfo, ContentType, Enrichment, Explanation, FeedbackEvent, FeedbackKind,
    FeedbackReceipt, ProviderKind, ProviderTrace, RawResult, RelatedTerm, RetrievalRequest,
    RetrievalResponse, SearchMode, SourceInfo, TrustTier,
};
