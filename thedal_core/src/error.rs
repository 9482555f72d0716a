// src/error.rs
use crate::types::ProviderKind;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: ProviderKind,
        message: String,
    },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable machine-readable code for API error bodies.
    pub fn code_str(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "invalid_input",
            EngineError::Timeout(_) => "timeout",
            EngineError::Provider { .. } => "provider_error",
            EngineError::HttpRequest(_) => "upstream_error",
            EngineError::Config(_) => "config_error",
            EngineError::Io(_) | EngineError::SerdeJson(_) => "internal_error",
        }
    }

    pub fn provider(provider: ProviderKind, message: impl Into<String>) -> Self {
        EngineError::Provider {
            provider,
            message: message.into(),
        }
    }
}
