//! Media-catalog adapter.
//!
//! Wraps the media collaborator exposing `search(query, types)` as a JSON
//! GET endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{extract_relevance, extract_str, find_results_array, FetchOptions, ProviderAdapter};
use crate::config::ProviderConfig;
use crate::error::EngineError;
use crate::types::{ContentType, ProviderKind, RawResult};

pub struct MediaCatalogAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl MediaCatalogAdapter {
    pub fn new(config: &ProviderConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn type_filter(opts: &FetchOptions) -> String {
        let media_types: Vec<&str> = opts
            .types
            .iter()
            .filter(|t| {
                matches!(
                    t,
                    ContentType::Movie | ContentType::Tv | ContentType::Podcast
                )
            })
            .map(|t| t.as_str())
            .collect();
        if media_types.is_empty() {
            "movie,tv,podcast".to_string()
        } else {
            media_types.join(",")
        }
    }
}

fn normalize(raw: &Value) -> Vec<RawResult> {
    find_results_array(raw)
        .into_iter()
        .filter_map(|item| {
            let title = extract_str(item, &["title", "name"])?;
            let content_type = super::parse_content_type(
                item.get("type")
                    .or_else(|| item.get("mediaType"))
                    .and_then(|v| v.as_str()),
                ContentType::Movie,
            );
            let mut result = RawResult::new(title, content_type);
            if let Some(url) = extract_str(item, &["url", "link", "webUrl"]) {
                result = result.with_url(url);
            }
            if let Some(snippet) = extract_str(item, &["overview", "description", "tagline"]) {
                result = result.with_snippet(snippet);
            }
            if let Some(score) = extract_relevance(item, &["score", "matchScore"]) {
                result = result.with_relevance(score);
            }
            let year = item.get("year").cloned().unwrap_or(Value::Null);
            let catalog_id = item.get("id").cloned().unwrap_or(Value::Null);
            if !year.is_null() || !catalog_id.is_null() {
                result = result.with_metadata(json!({ "id": catalog_id, "year": year }));
            }
            Some(result)
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for MediaCatalogAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Media
    }

    async fn fetch(
        &self,
        query: &str,
        opts: &FetchOptions,
        timeout: Duration,
    ) -> Result<Vec<RawResult>, EngineError> {
        let url = format!(
            "{}/search?q={}&types={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            Self::type_filter(opts),
            opts.limit,
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
