//! Ontology-backed canonicalization and enrichment.
//!
//! The ontology/dictionary collaborator resolves free text to concepts and
//! serves synonym lists and related-term edges. Both stages are best
//! effort: a candidate that resolves to nothing is left untouched, and a
//! collaborator error is logged and contained, never failing the request.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::OntologyConfig;
use crate::error::EngineError;
use crate::types::{CanonicalInfo, Candidate, Enrichment, RelatedTerm};

#[async_trait]
pub trait Ontology: Send + Sync {
    /// Resolve free text against the term/alias/synonym index.
    ///
    /// When the text matches multiple concepts the collaborator returns the
    /// highest-confidence one; that concept is authoritative here.
    async fn resolve_term(&self, text: &str) -> Result<Option<CanonicalInfo>, EngineError>;

    async fn synonyms(&self, concept_id: &str) -> Result<Vec<String>, EngineError>;

    async fn related(&self, concept_id: &str) -> Result<Vec<RelatedTerm>, EngineError>;
}

/// HTTP client for the ontology collaborator.
pub struct HttpOntology {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOntology {
    pub fn new(config: &OntologyConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_resolution(raw: &Value) -> Option<CanonicalInfo> {
    let concept_id = raw
        .get("conceptId")
        .or_else(|| raw.get("concept_id"))
        .or_else(|| raw.get("id"))
        .and_then(|v| v.as_str())?;
    let preferred_term = raw
        .get("preferredTerm")
        .or_else(|| raw.get("preferred_term"))
        .or_else(|| raw.get("term"))
        .and_then(|v| v.as_str())?;
    let confidence = raw
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    Some(CanonicalInfo {
        concept_id: concept_id.to_string(),
        preferred_term: preferred_term.to_string(),
        confidence,
    })
}

fn parse_related(raw: &Value) -> Vec<RelatedTerm> {
    let items = raw
        .get("related")
        .and_then(|v| v.as_array())
        .or_else(|| raw.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[]);

    items
        .iter()
        .filter_map(|item| {
            let term = item.get("term").and_then(|v| v.as_str())?;
            let kind = item
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("related");
            let weight = item
                .get("weight")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0);
            Some(RelatedTerm {
                term: term.to_string(),
                kind: kind.to_string(),
                weight,
            })
        })
        .collect()
}

#[async_trait]
impl Ontology for HttpOntology {
    async fn resolve_term(&self, text: &str) -> Result<Option<CanonicalInfo>, EngineError> {
        let url = format!(
            "{}/resolve?term={}",
            self.base_url,
            urlencoding::encode(text)
        );
        let raw: Value = self.client.get(&url).send().await?.json().await?;
        Ok(parse_resolution(&raw))
    }

    async fn synonyms(&self, concept_id: &str) -> Result<Vec<String>, EngineError> {
        let url = format!(
            "{}/concepts/{}/synonyms",
            self.base_url,
            urlencoding::encode(concept_id)
        );
        let raw: Value = self.client.get(&url).send().await?.json().await?;
        let synonyms = raw
            .get("synonyms")
            .and_then(|v| v.as_array())
            .or_else(|| raw.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(synonyms)
    }

    async fn related(&self, concept_id: &str) -> Result<Vec<RelatedTerm>, EngineError> {
        let url = format!(
            "{}/concepts/{}/related",
            self.base_url,
            urlencoding::encode(concept_id)
        );
        let raw: Value = self.client.get(&url).send().await?.json().await?;
        Ok(parse_related(&raw))
    }
}

/// Attach `canonical` to every candidate the ontology can resolve.
///
/// No match is not an error; the candidate passes through unchanged.
pub async fn canonicalize(ontology: &dyn Ontology, candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        if candidate.canonical.is_some() {
            continue;
        }
        match ontology.resolve_term(&candidate.title).await {
            Ok(Some(canonical)) => candidate.canonical = Some(canonical),
            Ok(None) => {}
            Err(err) => {
                debug!(title = %candidate.title, error = %err, "term resolution failed");
            }
        }
    }
}

/// Attach synonyms and related terms from the ontology.
///
/// Uses the resolved concept when present, otherwise a best-effort term
/// lookup on the title. Purely additive: identity fields are untouched.
pub async fn enrich(ontology: &dyn Ontology, candidates: &mut [Candidate]) {
    for candidate in candidates.iter_mut() {
        let (concept_id, confidence) = match &candidate.canonical {
            Some(canonical) => (canonical.concept_id.clone(), canonical.confidence),
            None => match ontology.resolve_term(&candidate.title).await {
                Ok(Some(resolution)) => (resolution.concept_id, resolution.confidence),
                Ok(None) => continue,
                Err(err) => {
                    debug!(title = %candidate.title, error = %err, "enrichment lookup failed");
                    continue;
                }
            },
        };

        let (synonyms, related) = futures::join!(
            ontology.synonyms(&concept_id),
            ontology.related(&concept_id)
        );

        let synonyms = match synonyms {
            Ok(list) => list,
            Err(err) => {
                debug!(concept = %concept_id, error = %err, "synonym lookup failed");
                Vec::new()
            }
        };
        let related = match related {
            Ok(list) => list,
            Err(err) => {
                debug!(concept = %concept_id, error = %err, "related-term lookup failed");
                Vec::new()
            }
        };

        if synonyms.is_empty() && related.is_empty() {
            continue;
        }

        candidate.enrichment = Some(Enrichment {
            synonyms,
            related,
            confidence,
        });
    }
}
