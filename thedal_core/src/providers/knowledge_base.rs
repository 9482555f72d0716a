//! Local knowledge-base adapter.
//!
//! Wraps the document-search collaborator exposing
//! `search(query, filters, mode)` as a JSON POST endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{extract_relevance, extract_str, find_results_array, FetchOptions, ProviderAdapter};
use crate::config::ProviderConfig;
use crate::error::EngineError;
use crate::types::{ContentType, ProviderKind, RawResult};

pub struct KnowledgeBaseAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl KnowledgeBaseAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn normalize(raw: &Value) -> Vec<RawResult> {
    find_results_array(raw)
        .into_iter()
        .filter_map(|item| {
            let title = extract_str(item, &["title", "name"])?;
            let content_type = super::parse_content_type(
                item.get("contentType")
                    .or_else(|| item.get("content_type"))
                    .or_else(|| item.get("type"))
                    .and_then(|v| v.as_str()),
                ContentType::Kb,
            );
            let mut result = RawResult::new(title, content_type);
            if let Some(url) = extract_str(item, &["url", "uri", "link"]) {
                result = result.with_url(url);
            }
            if let Some(snippet) = extract_str(item, &["snippet", "excerpt", "summary", "text"]) {
                result = result.with_snippet(snippet);
            }
            if let Some(score) = extract_relevance(item, &["score", "relevance", "similarity"]) {
                result = result.with_relevance(score);
            }
            if let Some(doc_id) = item.get("documentId").or_else(|| item.get("id")) {
                result = result.with_metadata(json!({ "documentId": doc_id }));
            }
            Some(result)
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for KnowledgeBaseAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::KnowledgeBase
    }

    async fn fetch(
        &self,
        query: &str,
        opts: &FetchOptions,
        timeout: Duration,
    ) -> Result<Vec<RawResult>, EngineError> {
        let types: Vec<&str> = opts.types.iter().map(|t| t.as_str()).collect();
        let body = json!({
            "query": query,
            "mode": opts.mode.as_str(),
            "limit": opts.limit,
            "filters": { "types": types },
        });

        let raw: Value = self
            .client
            .post(format!("{}/search", self.base_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut results = normalize(&raw);
        results.truncate(opts.limit);
        Ok(results)
    }
}
