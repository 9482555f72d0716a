//! Engine configuration.
//!
//! Loaded from a TOML file with serde defaults for every field, then
//! overlaid with environment variables. Nothing operational is
//! hard-coded: provider base URLs and timeouts, the cache TTL, and the
//! breaker thresholds all live here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::breaker::BreakerConfig;
use crate::error::EngineError;
use crate::types::{ProviderKind, TrustTier, DEFAULT_TIMEOUT_MS};

/// Cache TTL override, in milliseconds.
pub const ENV_CACHE_TTL_MS: &str = "THEDAL_CACHE_TTL_MS";

/// Listen address override for the HTTP server.
pub const ENV_BIND: &str = "THEDAL_BIND";

const DEFAULT_CACHE_TTL_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
    pub trust_tier: TrustTier,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            trust_tier: TrustTier::Medium,
        }
    }
}

fn default_web() -> ProviderConfig {
    ProviderConfig {
        base_url: "http://127.0.0.1:8080".into(),
        trust_tier: TrustTier::Low,
        ..ProviderConfig::default()
    }
}

fn default_kb() -> ProviderConfig {
    ProviderConfig {
        base_url: "http://127.0.0.1:7700".into(),
        trust_tier: TrustTier::High,
        ..ProviderConfig::default()
    }
}

fn default_media() -> ProviderConfig {
    ProviderConfig {
        base_url: "http://127.0.0.1:8096".into(),
        trust_tier: TrustTier::Medium,
        ..ProviderConfig::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    #[serde(default = "default_web")]
    pub web: ProviderConfig,
    #[serde(default = "default_kb")]
    pub kb: ProviderConfig,
    #[serde(default = "default_media")]
    pub media: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            web: default_web(),
            kb: default_kb(),
            media: default_media(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OntologyConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8900".into(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8343".into(),
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub providers: ProvidersConfig,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    pub breaker: BreakerConfig,
    pub ontology: OntologyConfig,
    pub server: ServerConfig,
    /// JSONL mirror for feedback events; in-memory only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_path: Option<PathBuf>,
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            breaker: BreakerConfig::default(),
            ontology: OntologyConfig::default(),
            server: ServerConfig::default(),
            feedback_path: None,
        }
    }
}

impl EngineConfig {
    /// Load a TOML config file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&raw)
            .map_err(|err| EngineError::Config(format!("{}: {err}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_CACHE_TTL_MS) {
            match raw.parse::<u64>() {
                Ok(ttl) => self.cache_ttl_ms = ttl,
                Err(_) => tracing::warn!(%raw, "ignoring unparseable THEDAL_CACHE_TTL_MS"),
            }
        }
        if let Ok(bind) = std::env::var(ENV_BIND) {
            self.server.bind = bind;
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Web => &self.providers.web,
            ProviderKind::KnowledgeBase => &self.providers.kb,
            ProviderKind::Media => &self.providers.media,
        }
    }

    /// Providers enabled by configuration, in registry order.
    pub fn enabled_kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.provider(*kind).enabled)
            .collect()
    }
}
