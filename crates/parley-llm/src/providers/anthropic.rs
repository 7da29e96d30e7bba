//! Anthropic messages API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use parley_core::Message;

use crate::error::{BackendError, Result};
use crate::extract::extract_text;
use crate::provider::{BackendProvider, GenerationParams, TextStream};

use super::common::sse::text_stream_from_sse;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn body(&self, messages: &[Message], params: &GenerationParams, stream: bool) -> Value {
        // The messages API takes the system prompt as a top-level field,
        // not as a message in the list.
        let turns: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": params.model,
            "max_tokens": self.max_tokens,
            "temperature": params.temperature,
            "messages": turns,
            "stream": stream,
        });
        if !params.system_prompt.is_empty() {
            body["system"] = json!(params.system_prompt);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(BackendError::from_status(status, format!("Anthropic: {}", text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendProvider for AnthropicBackend {
    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String> {
        let body = self.body(messages, params, false);
        let response = self.post(&body).await?;
        let value: Value = response.json().await?;

        extract_text(&value).ok_or_else(|| BackendError::EmptyResponse(value.to_string()))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let body = self.body(messages, params, true);
        let response = self.post(&body).await?;

        log::debug!("Anthropic stream started for model {}", params.model);

        Ok(text_stream_from_sse(response, |event, data| {
            // Only content_block_delta events carry text; everything else
            // (message_start, ping, message_stop, ...) is protocol framing.
            if event != "content_block_delta" {
                return Ok(None);
            }

            let value: Value = match serde_json::from_str(data) {
                Ok(value) => value,
                Err(e) => {
                    // A malformed unit is skipped, not fatal.
                    log::warn!("Skipping malformed Anthropic SSE data: {}", e);
                    return Ok(None);
                }
            };

            if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown Anthropic error");
                return Err(BackendError::Stream(message.to_string()));
            }

            Ok(value
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string))
        }))
    }

    fn known_models(&self) -> Vec<(&'static str, u32)> {
        vec![
            ("claude-3-5-sonnet-20241022", 200_000),
            ("claude-3-5-haiku-20241022", 200_000),
            ("claude-3-opus-20240229", 200_000),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_extracts_content_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "part response"}]
            })))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("sk-ant").with_base_url(server.uri());
        let text = backend
            .generate(&[Message::user("hi")], &GenerationParams::new("claude-3-opus-20240229"))
            .await
            .unwrap();
        assert_eq!(text, "part response");
    }

    #[tokio::test]
    async fn stream_reads_content_block_deltas() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("sk-ant").with_base_url(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &GenerationParams::new("claude-3-opus-20240229"))
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hi there");
    }

    #[tokio::test]
    async fn stream_skips_malformed_data_units() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "event: content_block_delta\ndata: not json either\n\n",
            "event: content_block_delta\ndata: {\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("sk-ant").with_base_url(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &GenerationParams::new("claude-3-opus-20240229"))
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hi there");
    }

    #[tokio::test]
    async fn throttling_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::new("sk-ant").with_base_url(server.uri());
        let err = backend
            .generate(&[Message::user("hi")], &GenerationParams::new("claude-3-opus-20240229"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(429));
    }
}
