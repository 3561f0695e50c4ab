//! Backend construction: turns configuration into a ready backend.
//!
//! Agents may override the model; each distinct model gets its own
//! backend instance. Only the selector's backend is cached.

use std::collections::HashMap;
use std::sync::Arc;

use agenx_config::AppConfig;
use agenx_core::error::ProviderError;
use agenx_core::provider::ModelBackend;

use crate::cache::CachedBackend;
use crate::openai_compat::OpenAiBackend;

/// Hands out one backend per model name.
pub struct BackendRouter {
    config: AppConfig,
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendRouter {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            backends: HashMap::new(),
        }
    }

    /// The backend for the configured default model.
    pub fn default_backend(&mut self) -> Result<Arc<dyn ModelBackend>, ProviderError> {
        let model = self.config.default_model.clone();
        self.for_model(&model)
    }

    /// The backend for `model`, building it on first use.
    pub fn for_model(&mut self, model: &str) -> Result<Arc<dyn ModelBackend>, ProviderError> {
        if let Some(backend) = self.backends.get(model) {
            return Ok(backend.clone());
        }
        let backend = build_backend(&self.config, model)?;
        self.backends.insert(model.to_string(), backend.clone());
        Ok(backend)
    }

    /// The backend for speaker selection, cached when `cache` is set.
    pub fn selector_backend(&mut self) -> Result<Arc<dyn ModelBackend>, ProviderError> {
        let backend = self.default_backend()?;
        if self.config.cache {
            Ok(Arc::new(CachedBackend::new(backend)))
        } else {
            Ok(backend)
        }
    }

    /// Models built so far.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }
}

/// Build one backend for `model` from configuration.
pub fn build_backend(config: &AppConfig, model: &str) -> Result<Arc<dyn ModelBackend>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key. Set AGENX_API_KEY or api_key in config.toml".into(),
            )
        })?;

    let backend = OpenAiBackend::new("openai", &config.base_url, api_key, model)?
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
    Ok(Arc::new(backend))
}
