//! General web-search adapter.
//!
//! Wraps a metasearch collaborator exposing
//! `search(query, categories, language)` as a JSON GET endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{extract_relevance, extract_str, find_results_array, FetchOptions, ProviderAdapter};
use crate::config::ProviderConfig;
use crate::error::EngineError;
use crate::types::{ContentType, ProviderKind, RawResult};

pub struct WebSearchAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl WebSearchAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn categories(opts: &FetchOptions) -> String {
        if opts.types.is_empty() {
            return "general".to_string();
        }
        let categories: Vec<&str> = opts
            .types
            .iter()
            .map(|t| match t {
                ContentType::Movie | ContentType::Tv => "videos",
                ContentType::Podcast => "music",
                _ => "general",
            })
            .collect();
        let mut categories = categories;
        categories.dedup();
        categories.join(",")
    }
}

fn normalize(raw: &Value) -> Vec<RawResult> {
    find_results_array(raw)
        .into_iter()
        .filter_map(|item| {
            let title = extract_str(item, &["title", "name"])?;
            let mut result = RawResult::new(title, ContentType::Article);
            if let Some(url) = extract_str(item, &["url", "link"]) {
                result = result.with_url(url);
            }
            if let Some(snippet) = extract_str(item, &["content", "snippet", "description"]) {
                result = result.with_snippet(snippet);
            }
            if let Some(score) = extract_relevance(item, &["score", "relevance"]) {
                result = result.with_relevance(score);
            }
            if let Some(engine) = item.get("engine") {
                result = result.with_metadata(serde_json::json!({ "engine": engine }));
            }
            Some(result)
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for WebSearchAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Web
    }

    async fn fetch(
        &self,
        query: &str,
        opts: &FetchOptions,
        timeout: Duration,
    ) -> Result<Vec<RawResult>, EngineError> {
        let url = format!(
            "{}/search?q={}&categories={}&language=en&format=json",
            self.base_url,
            urlencoding::encode(query),
            Self::categories(opts),
        );

        let raw: Value = self
            .client
            .get(&url)
            .timeout(timeout)
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
