//! Provider adapters: one per retrieval backend.
//!
//! Each adapter translates the canonical query into a backend-specific
//! call and normalizes the backend's native JSON into `RawResult`. The
//! passed timeout is a hard deadline applied at the request level, so a
//! slow backend produces a timeout error rather than an open-ended wait.
//! To the circuit breaker, a timeout and an application error are the
//! same thing: one failure.

mod knowledge_base;
mod media;
mod web;

pub use knowledge_base::KnowledgeBaseAdapter;
pub use media::MediaCatalogAdapter;
pub use web::WebSearchAdapter;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::types::{ContentType, ProviderKind, RawResult, SearchMode};

/// Per-request options forwarded to each adapter.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub limit: usize,
    pub mode: SearchMode,
    pub types: Vec<ContentType>,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fetch raw results for one query.
    ///
    /// Must return, successfully or with an error, no later than `timeout`
    /// after issue.
    async fn fetch(
        &self,
        query: &str,
        opts: &FetchOptions,
        timeout: Duration,
    ) -> Result<Vec<RawResult>, EngineError>;
}

/// Build the adapter table for every enabled provider.
pub fn build_adapters(
    config: &EngineConfig,
) -> Result<HashMap<ProviderKind, Arc<dyn ProviderAdapter>>, EngineError> {
    let mut adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>> = HashMap::new();
    for kind in config.enabled_kinds() {
        let provider = config.provider(kind);
        let adapter: Arc<dyn ProviderAdapter> = match kind {
            ProviderKind::Web => Arc::new(WebSearchAdapter::new(provider)?),
            ProviderKind::KnowledgeBase => Arc::new(KnowledgeBaseAdapter::new(provider)?),
            ProviderKind::Media => Arc::new(MediaCatalogAdapter::new(provider)?),
        };
        adapters.insert(kind, adapter);
    }
    Ok(adapters)
}

/// Find the results array in various response envelopes.
pub(crate) fn find_results_array(raw: &Value) -> Vec<&Value> {
    for field in &["results", "items", "hits", "documents"] {
        if let Some(arr) = raw.get(*field).and_then(|v| v.as_array()) {
            return arr.iter().collect();
        }
    }

    if let Some(arr) = raw.as_array() {
        return arr.iter().collect();
    }

    Vec::new()
}

pub(crate) fn extract_str(item: &Value, fields: &[&str]) -> Option<String> {
    for field in fields {
        if let Some(s) = item.get(*field).and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Relevance in [0, 1]; out-of-range backend scores are clamped.
pub(crate) fn extract_relevance(item: &Value, fields: &[&str]) -> Option<f64> {
    for field in fields {
        if let Some(score) = item.get(*field).and_then(|v| v.as_f64()) {
            return Some(score.clamp(0.0, 1.0));
        }
    }
    None
}

pub(crate) fn parse_content_type(raw: Option<&str>, fallback: ContentType) -> ContentType {
    match raw {
        Some("movie") => ContentType::Movie,
        Some("tv") | Some("series") | Some("show") => ContentType::Tv,
        Some("podcast") => ContentType::Podcast,
        Some("kb") | Some("document") | Some("doc") => ContentType::Kb,
        Some("article") | Some("page") => ContentType::Article,
        Some(_) => ContentType::Unknown,
        None => fallback,
    }
}
