//! Participant types - one configured model endpoint taking part in a conversation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of backend a participant talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl BackendKind {
    pub const ALL: &'static [BackendKind] = &[
        BackendKind::OpenAi,
        BackendKind::Anthropic,
        BackendKind::Gemini,
        BackendKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Anthropic => "anthropic",
            BackendKind::Gemini => "gemini",
            BackendKind::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured AI-model endpoint taking part in a conversation.
///
/// Created from configuration at conversation start; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub backend: BackendKind,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: String,
    /// Display name shown as message author. Defaults to the model id.
    pub name: String,
}

impl Participant {
    pub fn new(backend: BackendKind, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: Uuid::new_v4(),
            backend,
            name: model.clone(),
            model,
            temperature: 0.7,
            system_prompt: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_defaults_to_model() {
        let p = Participant::new(BackendKind::OpenAi, "gpt-4o-mini");
        assert_eq!(p.name, "gpt-4o-mini");
        assert_eq!(p.temperature, 0.7);
    }

    #[test]
    fn builders_chain() {
        let p = Participant::new(BackendKind::Anthropic, "claude-3-5-sonnet-20241022")
            .with_name("Claude")
            .with_temperature(0.2)
            .with_system_prompt("Be terse.");
        assert_eq!(p.name, "Claude");
        assert_eq!(p.temperature, 0.2);
        assert_eq!(p.system_prompt, "Be terse.");
    }

    #[test]
    fn backend_kind_serializes_lowercase() {
        let json = serde_json::to_string(&BackendKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }
}
