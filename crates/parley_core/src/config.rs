//! Injected read-only configuration: backend credentials, model catalog
//! tables, and runtime knobs.
//!
//! Built once (deserialized or assembled by the host) and passed by
//! reference into the registry and orchestrator; there is no global lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::participant::BackendKind;

/// Top-level configuration object consumed by the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub providers: ProviderConfigs,
    #[serde(default)]
    pub runtime: RuntimeOptions,
    /// Context-window limits per model id, with a conservative fallback.
    #[serde(default = "default_model_limits")]
    pub model_limits: HashMap<String, u32>,
    /// USD per 1k tokens per model id.
    #[serde(default = "default_pricing")]
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfigs::default(),
            runtime: RuntimeOptions::default(),
            model_limits: default_model_limits(),
            pricing: default_pricing(),
        }
    }
}

impl OrchestratorConfig {
    /// Context-window limit for a model, falling back to the conservative
    /// default rather than failing on unknown models.
    pub fn model_limit(&self, model: &str) -> u32 {
        self.model_limits
            .get(model)
            .copied()
            .unwrap_or(DEFAULT_MODEL_LIMIT)
    }

    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        self.pricing.get(model).copied().unwrap_or_default()
    }
}

/// Per-backend credential and endpoint sections. A missing section means
/// the backend is not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfigs {
    #[serde(default)]
    pub openai: Option<OpenAiConfig>,
    #[serde(default)]
    pub anthropic: Option<AnthropicConfig>,
    #[serde(default)]
    pub gemini: Option<GeminiConfig>,
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
}

impl ProviderConfigs {
    /// Backend kinds with a configured section.
    pub fn configured_kinds(&self) -> Vec<BackendKind> {
        let mut kinds = Vec::new();
        if self.openai.is_some() {
            kinds.push(BackendKind::OpenAi);
        }
        if self.anthropic.is_some() {
            kinds.push(BackendKind::Anthropic);
        }
        if self.gemini.is_some() {
            kinds.push(BackendKind::Gemini);
        }
        if self.ollama.is_some() {
            kinds.push(BackendKind::Ollama);
        }
        kinds
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Ollama needs no credential; only an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Cost per 1k tokens in USD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        // Local / unknown models cost nothing.
        Self { input: 0.0, output: 0.0 }
    }
}

/// Runtime knobs for retries, rate limiting, caching, budgets and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Retries after the initial attempt, for transient errors only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubled per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff delay ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add up to one base delay of random jitter to each backoff.
    #[serde(default)]
    pub retry_jitter: bool,
    /// Per-backend-kind call ceiling over a rolling 60 second window.
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: usize,
    /// Bound on a single backend call, in seconds. Timeouts are transient.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Budget warning threshold as a fraction of the context window.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Tokens reserved for the upcoming reply when reporting availability.
    #[serde(default = "default_token_buffer")]
    pub token_buffer: u32,
    /// Delay between turns in autonomous mode, in milliseconds.
    #[serde(default = "default_inter_turn_delay_ms")]
    pub inter_turn_delay_ms: u64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_jitter: false,
            calls_per_minute: default_calls_per_minute(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_size: default_cache_max_size(),
            warning_threshold: default_warning_threshold(),
            token_buffer: default_token_buffer(),
            inter_turn_delay_ms: default_inter_turn_delay_ms(),
        }
    }
}

pub const DEFAULT_MODEL_LIMIT: u32 = 4096;

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_calls_per_minute() -> usize {
    60
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_cache_max_size() -> usize {
    1000
}
fn default_warning_threshold() -> f64 {
    0.8
}
fn default_token_buffer() -> u32 {
    500
}
fn default_inter_turn_delay_ms() -> u64 {
    1000
}

fn default_model_limits() -> HashMap<String, u32> {
    let mut limits = HashMap::new();
    // OpenAI
    limits.insert("gpt-4o".into(), 128_000);
    limits.insert("gpt-4o-mini".into(), 128_000);
    limits.insert("gpt-4-turbo".into(), 128_000);
    limits.insert("gpt-4".into(), 8_192);
    limits.insert("gpt-3.5-turbo".into(), 16_385);
    // Anthropic
    limits.insert("claude-3-5-sonnet-20241022".into(), 200_000);
    limits.insert("claude-3-5-haiku-20241022".into(), 200_000);
    limits.insert("claude-3-opus-20240229".into(), 200_000);
    // Gemini
    limits.insert("gemini-2.0-flash-exp".into(), 1_000_000);
    limits.insert("gemini-1.5-pro".into(), 2_000_000);
    limits.insert("gemini-1.5-flash".into(), 1_000_000);
    limits
}

fn default_pricing() -> HashMap<String, ModelPricing> {
    let mut pricing = HashMap::new();
    pricing.insert("gpt-4o".into(), ModelPricing { input: 0.0025, output: 0.01 });
    pricing.insert("gpt-4o-mini".into(), ModelPricing { input: 0.00015, output: 0.0006 });
    pricing.insert("gpt-4-turbo".into(), ModelPricing { input: 0.01, output: 0.03 });
    pricing.insert("gpt-4".into(), ModelPricing { input: 0.03, output: 0.06 });
    pricing.insert("gpt-3.5-turbo".into(), ModelPricing { input: 0.0005, output: 0.0015 });
    pricing.insert(
        "claude-3-5-sonnet-20241022".into(),
        ModelPricing { input: 0.003, output: 0.015 },
    );
    pricing.insert(
        "claude-3-5-haiku-20241022".into(),
        ModelPricing { input: 0.0008, output: 0.004 },
    );
    pricing.insert(
        "claude-3-opus-20240229".into(),
        ModelPricing { input: 0.015, output: 0.075 },
    );
    pricing.insert("gemini-2.0-flash-exp".into(), ModelPricing { input: 0.0, output: 0.0 });
    pricing.insert("gemini-1.5-pro".into(), ModelPricing { input: 0.00125, output: 0.005 });
    pricing.insert(
        "gemini-1.5-flash".into(),
        ModelPricing { input: 0.000075, output: 0.0003 },
    );
    pricing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default_limit() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.model_limit("some-future-model"), DEFAULT_MODEL_LIMIT);
        assert_eq!(config.model_limit("gpt-4"), 8_192);
    }

    #[test]
    fn unknown_model_pricing_is_free() {
        let config = OrchestratorConfig::default();
        let pricing = config.pricing_for("llama2");
        assert_eq!(pricing.input, 0.0);
        assert_eq!(pricing.output, 0.0);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.runtime.max_retries, 3);
        assert_eq!(config.runtime.calls_per_minute, 60);
        assert_eq!(config.runtime.cache_ttl_secs, 3600);
        assert_eq!(config.runtime.cache_max_size, 1000);
        assert!(config.providers.openai.is_none());
    }

    #[test]
    fn configured_kinds_reflect_sections() {
        let mut providers = ProviderConfigs::default();
        providers.ollama = Some(OllamaConfig { base_url: default_ollama_url() });
        assert_eq!(providers.configured_kinds(), vec![BackendKind::Ollama]);
    }
}
