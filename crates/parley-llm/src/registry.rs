//! Backend registry
//!
//! An explicit mapping from backend kind to a constructed provider, built
//! once from configuration and passed by reference wherever calls are made.
//! There is no ambient global lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{BackendKind, OrchestratorConfig};

use crate::error::{BackendError, Result};
use crate::provider::BackendProvider;
use crate::providers::{AnthropicBackend, GeminiBackend, OllamaBackend, OpenAiBackend};

#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn BackendProvider>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every configured provider section.
    ///
    /// Sections with an empty credential are configuration errors; missing
    /// sections simply leave that backend unregistered.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let mut registry = Self::new();

        if let Some(openai) = &config.providers.openai {
            if openai.api_key.is_empty() {
                return Err(BackendError::Configuration("OpenAI API key is required".into()));
            }
            let mut backend = OpenAiBackend::new(&openai.api_key);
            if let Some(base_url) = &openai.base_url {
                if !base_url.is_empty() {
                    backend = backend.with_base_url(base_url);
                }
            }
            registry.register(BackendKind::OpenAi, Arc::new(backend));
        }

        if let Some(anthropic) = &config.providers.anthropic {
            if anthropic.api_key.is_empty() {
                return Err(BackendError::Configuration("Anthropic API key is required".into()));
            }
            let mut backend = AnthropicBackend::new(&anthropic.api_key);
            if let Some(base_url) = &anthropic.base_url {
                if !base_url.is_empty() {
                    backend = backend.with_base_url(base_url);
                }
            }
            if let Some(max_tokens) = anthropic.max_tokens {
                backend = backend.with_max_tokens(max_tokens);
            }
            registry.register(BackendKind::Anthropic, Arc::new(backend));
        }

        if let Some(gemini) = &config.providers.gemini {
            if gemini.api_key.is_empty() {
                return Err(BackendError::Configuration("Gemini API key is required".into()));
            }
            let mut backend = GeminiBackend::new(&gemini.api_key);
            if let Some(base_url) = &gemini.base_url {
                if !base_url.is_empty() {
                    backend = backend.with_base_url(base_url);
                }
            }
            registry.register(BackendKind::Gemini, Arc::new(backend));
        }

        if let Some(ollama) = &config.providers.ollama {
            registry.register(BackendKind::Ollama, Arc::new(OllamaBackend::new(&ollama.base_url)));
        }

        Ok(registry)
    }

    /// Register (or replace) a backend. Used by `from_config` and by tests
    /// injecting scripted providers.
    pub fn register(&mut self, kind: BackendKind, provider: Arc<dyn BackendProvider>) {
        self.backends.insert(kind, provider);
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn BackendProvider>> {
        self.backends.get(&kind).cloned().ok_or_else(|| {
            BackendError::Configuration(format!("No backend configured for kind '{}'", kind))
        })
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::config::{OllamaConfig, OpenAiConfig};

    #[test]
    fn empty_registry_reports_configuration_error() {
        let registry = BackendRegistry::new();
        let err = registry.get(BackendKind::OpenAi).unwrap_err();
        assert!(matches!(err, BackendError::Configuration(_)));
    }

    #[test]
    fn from_config_registers_configured_sections() {
        let mut config = OrchestratorConfig::default();
        config.providers.openai = Some(OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: None,
        });
        config.providers.ollama = Some(OllamaConfig {
            base_url: "http://localhost:11434".into(),
        });

        let registry = BackendRegistry::from_config(&config).unwrap();
        assert!(registry.get(BackendKind::OpenAi).is_ok());
        assert!(registry.get(BackendKind::Ollama).is_ok());
        assert!(registry.get(BackendKind::Gemini).is_err());
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = OrchestratorConfig::default();
        config.providers.openai = Some(OpenAiConfig {
            api_key: String::new(),
            base_url: None,
        });

        let err = BackendRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, BackendError::Configuration(_)));
    }
}
