//! TTL cache of complete merged responses.
//!
//! Keyed by a deterministic fingerprint of the normalized request. Expiry
//! is lazy: stale entries are treated as absent on read and dropped then.
//! Concurrent writes for the same key are last-writer-wins; entries are
//! idempotent derivations of the same request, so nothing is lost.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::{RetrievalRequest, RetrievalResponse};

struct CacheEntry {
    response: RetrievalResponse,
    inserted_at: Instant,
}

pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Deterministic fingerprint of the normalized request.
///
/// Covers every field that changes the merged result set: query, provider
/// set, limit, mode, type filter, and the expand flag. Flags that only
/// shape the response envelope (explain, cache control) are excluded.
pub fn fingerprint(request: &RetrievalRequest) -> String {
    let mut providers: Vec<&str> = request.providers.iter().map(|p| p.as_str()).collect();
    providers.sort_unstable();

    let mut types: Vec<&str> = request.types.iter().map(|t| t.as_str()).collect();
    types.sort_unstable();

    format!(
        "q={}|p={}|l={}|m={}|t={}|x={}",
        request.query.trim().to_lowercase(),
        providers.join(","),
        request.limit,
        request.mode.as_str(),
        types.join(","),
        request.expand,
    )
}

impl ResponseCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<RetrievalResponse> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, response: RetrievalResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key,
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
