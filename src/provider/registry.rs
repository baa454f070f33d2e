//! Provider registry
//!
//! Creates providers from config and caches them by
//! `backend:base_url:model`. Owned by whoever builds the agent; there is no
//! process-wide instance.

use super::{LlmProvider, OpenAiCompatibleProvider, ProviderConfig, ProviderError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached provider for this config, creating it on first use
    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = config.cache_key();
        let mut providers = self.providers.lock();

        if let Some(existing) = providers.get(&key) {
            return Ok(existing.clone());
        }

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(config)?);
        tracing::debug!(key = %key, "Created provider");
        providers.insert(key, provider.clone());
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.lock().is_empty()
    }

    /// Dispose and forget every cached provider
    pub fn dispose_all(&self) {
        let drained: Vec<_> = self.providers.lock().drain().collect();
        for (key, provider) in drained {
            tracing::debug!(key = %key, "Disposing provider");
            provider.dispose();
        }
    }

    /// Default base URL for a backend
    pub fn default_url(backend: super::Backend) -> &'static str {
        backend.default_base_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Backend;

    #[test]
    fn test_create_is_cached_per_key() {
        let registry = ProviderRegistry::new();
        let a = registry.create(&ProviderConfig::ollama("llama3.1")).unwrap();
        let b = registry.create(&ProviderConfig::ollama("llama3.1")).unwrap();
        let c = registry.create(&ProviderConfig::ollama("qwen2.5")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_dispose_all_clears_cache() {
        let registry = ProviderRegistry::new();
        registry.create(&ProviderConfig::lmstudio("local")).unwrap();
        registry.dispose_all();
        assert!(registry.is_empty());
        assert_eq!(
            ProviderRegistry::default_url(Backend::LmStudio),
            "http://localhost:1234"
        );
    }
}
