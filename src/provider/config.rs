//! Provider configuration

use super::Backend;
use serde::{Deserialize, Serialize};

/// Configuration for one provider instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend dialect to speak
    pub backend: Backend,
    /// API base URL; the backend default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Inline API key (takes precedence over `api_key_env`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Model id to request
    pub model: String,
}

impl ProviderConfig {
    /// Local Ollama server
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            backend: Backend::Ollama,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Local LM Studio server
    pub fn lmstudio(model: impl Into<String>) -> Self {
        Self {
            backend: Backend::LmStudio,
            model: model.into(),
            ..Default::default()
        }
    }

    /// OpenAI, key from `OPENAI_API_KEY`
    pub fn openai(model: impl Into<String>) -> Self {
        Self {
            backend: Backend::OpenAi,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Gemini through its OpenAI-compatible endpoint, key from `GEMINI_API_KEY`
    pub fn gemini(model: impl Into<String>) -> Self {
        Self {
            backend: Backend::Gemini,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Base URL actually used, without a trailing slash
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.backend.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Cache key used by the provider registry
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.backend, self.effective_base_url(), self.model)
    }

    /// API key from the config, else from the environment (after loading `.env`).
    /// Falls back to the backend's conventional variable name.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }

        let var = self
            .api_key_env
            .as_deref()
            .or_else(|| self.backend.default_api_key_env())?;
        let _ = dotenvy::dotenv();
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }
}
