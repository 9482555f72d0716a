//! Cross-provider result merging.
//!
//! Candidates that represent the same real-world item are grouped by
//! normalized URL (or normalized title when no URL survives
//! normalization). One representative per group is kept; the rest
//! contribute their provider identity to the representative's provenance.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use url::Url;

use crate::types::Candidate;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Scheme/host/path normalization for dedupe keys.
///
/// Query strings and fragments are dropped: tracking parameters routinely
/// differ between providers pointing at the same page.
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = parsed.path().trim_end_matches('/');
    Some(format!(
        "{}://{}{}",
        parsed.scheme().to_ascii_lowercase(),
        host,
        path
    ))
}

/// Lower-cased, punctuation-stripped, whitespace-collapsed title key.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

fn group_key(candidate: &Candidate) -> String {
    match candidate.normalized_url.as_deref() {
        Some(url) if !url.is_empty() => format!("u:{url}"),
        _ => format!("t:{}", normalize_title(&candidate.title)),
    }
}

/// Merge candidates that share a dedupe key.
///
/// The representative is the group member from the highest trust tier,
/// first-seen order breaking ties. Output order is first-seen group order,
/// so the pass is idempotent.
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let key = group_key(&candidate);
        match by_key.get(&key) {
            None => {
                by_key.insert(key, merged.len());
                merged.push(candidate);
            }
            Some(&index) => {
                let representative = &mut merged[index];
                let mut provenance = std::mem::take(&mut representative.provenance);
                for provider in &candidate.provenance {
                    if !provenance.contains(provider) {
                        provenance.push(*provider);
                    }
                }
                if candidate.source.trust_tier > representative.source.trust_tier {
                    // Higher-trust source takes over, keeping group position.
                    *representative = candidate;
                }
                representative.provenance = provenance;
            }
        }
    }

    merged
}
