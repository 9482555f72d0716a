//! Per-provider circuit breakers.
//!
//! Each provider gets its own breaker behind its own lock, so a stampede
//! against one failing backend never serializes calls to the others. The
//! registry is owned by the engine instance rather than living in a
//! process-wide global, which keeps concurrent engines (and tests)
//! independent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::ProviderKind;

/// Breaker state machine: closed -> open -> half-open -> closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds shared by every breaker in a registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// Cooldown after opening before a single trial call is allowed.
    pub reset_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            reset_ms: 30_000,
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn try_acquire(&mut self, config: &BreakerConfig, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = self
                    .opened_at
                    .map(|at| now.duration_since(at) >= Duration::from_millis(config.reset_ms))
                    .unwrap_or(true);
                if cooled_down {
                    self.state = BreakerState::HalfOpen;
                    self.half_open_successes = 0;
                    self.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            // One trial call at a time while probing recovery.
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
        }
    }

    fn on_success(&mut self, config: &BreakerConfig) {
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures = 0;
            }
            BreakerState::HalfOpen => {
                self.probe_in_flight = false;
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    *self = BreakerCore::new();
                }
            }
            // A success landing after the breaker re-opened is stale.
            BreakerState::Open => {}
        }
    }

    fn on_failure(&mut self, config: &BreakerConfig, now: Instant) {
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                }
            }
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                self.half_open_successes = 0;
                self.probe_in_flight = false;
            }
            BreakerState::Open => {}
        }
    }
}

/// Point-in-time view of one breaker, for `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub provider: ProviderKind,
    pub state: BreakerState,
    pub consecutive_failures: u32,
}

/// One breaker per provider, each behind its own lock.
pub struct BreakerRegistry {
    config: BreakerConfig,
    entries: HashMap<ProviderKind, Mutex<BreakerCore>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        let entries = ProviderKind::ALL
            .iter()
            .map(|kind| (*kind, Mutex::new(BreakerCore::new())))
            .collect();
        Self { config, entries }
    }

    fn with_entry<T>(&self, provider: ProviderKind, f: impl FnOnce(&mut BreakerCore) -> T) -> T {
        let entry = self
            .entries
            .get(&provider)
            .expect("registry covers every provider kind");
        let mut core = entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut core)
    }

    /// Whether a call to this provider is currently permitted.
    ///
    /// Flips open -> half-open once the cooldown has elapsed; the permitted
    /// call is the single recovery probe.
    pub fn try_acquire(&self, provider: ProviderKind) -> bool {
        let now = Instant::now();
        self.with_entry(provider, |core| core.try_acquire(&self.config, now))
    }

    pub fn on_success(&self, provider: ProviderKind) {
        self.with_entry(provider, |core| core.on_success(&self.config));
    }

    pub fn on_failure(&self, provider: ProviderKind) {
        let now = Instant::now();
        self.with_entry(provider, |core| core.on_failure(&self.config, now));
    }

    pub fn state(&self, provider: ProviderKind) -> BreakerState {
        self.with_entry(provider, |core| core.state)
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        ProviderKind::ALL
            .iter()
            .map(|kind| {
                self.with_entry(*kind, |core| BreakerSnapshot {
                    provider: *kind,
                    state: core.state,
                    consecutive_failures: core.consecutive_failures,
                })
            })
            .collect()
    }
}
