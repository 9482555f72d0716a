//! Explainable composite scoring.
//!
//! `rank_score = base_score * provider_weight + canonical_boost + related_boost`
//!
//! The explainer runs the exact same computation and reports every named
//! term, so a score is always reproducible from its breakdown alone.

use std::collections::BTreeMap;

use crate::types::{Candidate, Explanation};

/// Fixed increment applied when canonical confidence clears the floor.
pub const CANONICAL_BOOST: f64 = 0.25;

/// Minimum canonical confidence for the boost to apply.
pub const CANONICAL_CONFIDENCE_FLOOR: f64 = 0.5;

/// Contribution per unit of related-term weight.
pub const RELATED_WEIGHT_FACTOR: f64 = 0.05;

/// Ceiling on the summed related-term contribution.
pub const RELATED_BOOST_CAP: f64 = 0.25;

/// Base score assumed when neither the provider nor a query is available.
pub const DEFAULT_BASE_SCORE: f64 = 0.5;

/// Provider-reported relevance, or a token-overlap heuristic when absent.
fn base_score(candidate: &Candidate, query: Option<&str>) -> f64 {
    if let Some(relevance) = candidate.relevance {
        return relevance.clamp(0.0, 1.0);
    }
    match query {
        Some(query) => content_match(candidate, query),
        None => DEFAULT_BASE_SCORE,
    }
}

/// Fraction of query tokens present in the candidate's title or snippet.
fn content_match(candidate: &Candidate, query: &str) -> f64 {
    let haystack = match &candidate.snippet {
        Some(snippet) => format!("{} {}", candidate.title, snippet).to_lowercase(),
        None => candidate.title.to_lowercase(),
    };
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return DEFAULT_BASE_SCORE;
    }
    let hits = tokens
        .iter()
        .filter(|token| haystack.contains(&token.to_lowercase()))
        .count();
    hits as f64 / tokens.len() as f64
}

fn canonical_boost(candidate: &Candidate) -> f64 {
    match &candidate.canonical {
        Some(canonical) if canonical.confidence >= CANONICAL_CONFIDENCE_FLOOR => CANONICAL_BOOST,
        _ => 0.0,
    }
}

fn related_boost(candidate: &Candidate) -> f64 {
    let sum: f64 = candidate
        .enrichment
        .as_ref()
        .map(|e| e.related.iter().map(|r| r.weight).sum())
        .unwrap_or(0.0);
    (sum * RELATED_WEIGHT_FACTOR).min(RELATED_BOOST_CAP)
}

/// Score one candidate and name every term that produced the total.
pub fn explain_candidate(candidate: &Candidate, query: Option<&str>) -> Explanation {
    let base = base_score(candidate, query);
    let provider_weight = candidate.source.trust_tier.weight();
    let canonical = canonical_boost(candidate);
    let related = related_boost(candidate);
    let total = base * provider_weight + canonical + related;

    let mut breakdown = BTreeMap::new();
    breakdown.insert("baseScore".to_string(), base);
    breakdown.insert("providerWeight".to_string(), provider_weight);
    breakdown.insert("canonicalBoost".to_string(), canonical);
    breakdown.insert("relatedBoost".to_string(), related);

    Explanation {
        total_score: total,
        breakdown,
    }
}

/// Sort candidates by descending score and assign 1-based ranks.
///
/// Ties break by provider trust tier, then first-seen order (the sort is
/// stable). When `explain` is set the full breakdown rides along on each
/// candidate.
pub fn rank_candidates(candidates: &mut Vec<Candidate>, query: Option<&str>, explain: bool) {
    for candidate in candidates.iter_mut() {
        let explanation = explain_candidate(candidate, query);
        candidate.rank_score = Some(explanation.total_score);
        candidate.explanation = explain.then_some(explanation);
    }

    candidates.sort_by(|a, b| {
        let score_a = a.rank_score.unwrap_or(0.0);
        let score_b = b.rank_score.unwrap_or(0.0);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.source.trust_tier.cmp(&a.source.trust_tier))
    });

    for (index, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = Some(index + 1);
    }
}
