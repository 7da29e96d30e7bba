//! The backend provider trait - one uniform call interface per backend kind.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use parley_core::Message;

use crate::error::Result;

/// Generation parameters for one call, taken from the participant.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl GenerationParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            system_prompt: String::new(),
        }
    }
}

/// A finite, non-restartable sequence of text fragments.
///
/// Dropping the stream cancels the call and releases the transport.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Uniform call interface over heterogeneous model backends.
#[async_trait]
pub trait BackendProvider: Send + Sync {
    /// Generate a complete response synchronously.
    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String>;

    /// Generate a streaming response as a lazy sequence of fragments.
    ///
    /// The default falls back to the synchronous call and yields the whole
    /// text as one fragment, for backends without incremental output.
    async fn generate_stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let text = self.generate(messages, params).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Models this backend knows about, as `(id, context_window)` pairs.
    fn known_models(&self) -> Vec<(&'static str, u32)> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BackendProvider")
    }
}
