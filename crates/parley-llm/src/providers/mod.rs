//! Concrete backend adapters.

pub mod anthropic;
pub mod common;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use parley_core::Message;
use serde_json::{json, Value};

/// Role/content message array in the OpenAI style, with the participant's
/// system prompt prepended when present.
pub(crate) fn openai_style_messages(messages: &[Message], system_prompt: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        out.push(json!({"role": "system", "content": system_prompt}));
    }
    for message in messages {
        out.push(json!({
            "role": message.role.as_str(),
            "content": message.content,
        }));
    }
    out
}
