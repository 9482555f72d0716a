//! Process-wide counters consumed by `/metrics` and `/status`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::types::{ProviderKind, ResponseMetrics};

#[derive(Default)]
struct ProviderCounters {
    calls: AtomicU64,
    last_latency_ms: AtomicU64,
}

/// Shared, lock-free counters. One instance per engine.
pub struct Metrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    providers: HashMap<ProviderKind, ProviderCounters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            providers: ProviderKind::ALL
                .iter()
                .map(|kind| (*kind, ProviderCounters::default()))
                .collect(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_call(&self, provider: ProviderKind, elapsed: Duration) {
        if let Some(counters) = self.providers.get(&provider) {
            counters.calls.fetch_add(1, Ordering::Relaxed);
            counters
                .last_latency_ms
                .store(elapsed.as_millis() as u64, Ordering::Relaxed);
        }
    }

    pub fn last_latency_ms(&self, provider: ProviderKind) -> u64 {
        self.providers
            .get(&provider)
            .map(|c| c.last_latency_ms.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// The two counters echoed into every response body.
    pub fn response_metrics(&self) -> ResponseMetrics {
        ResponseMetrics {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            providers: self
                .providers
                .iter()
                .map(|(kind, counters)| {
                    (
                        kind.as_str().to_string(),
                        ProviderMetrics {
                            calls: counters.calls.load(Ordering::Relaxed),
                            last_latency_ms: counters.last_latency_ms.load(Ordering::Relaxed),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub calls: u64,
    pub last_latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub providers: BTreeMap<String, ProviderMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_cache_hit();
        metrics.record_provider_call(ProviderKind::Web, Duration::from_millis(42));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.providers["web"].calls, 1);
        assert_eq!(snapshot.providers["web"].last_latency_ms, 42);
        assert_eq!(snapshot.providers["media"].calls, 0);
        assert_eq!(metrics.last_latency_ms(ProviderKind::Web), 42);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;

        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.record_request();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.response_metrics().requests, 400);
    }
}
