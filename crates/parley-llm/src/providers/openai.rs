//! OpenAI chat completions adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use parley_core::Message;

use crate::error::{BackendError, Result};
use crate::extract::extract_text;
use crate::provider::{BackendProvider, GenerationParams, TextStream};

use super::common::sse::text_stream_from_sse;
use super::openai_style_messages;

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn body(&self, messages: &[Message], params: &GenerationParams, stream: bool) -> Value {
        json!({
            "model": params.model,
            "messages": openai_style_messages(messages, &params.system_prompt),
            "temperature": params.temperature,
            "stream": stream,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(BackendError::from_status(status, format!("OpenAI: {}", text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendProvider for OpenAiBackend {
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

        log::debug!("OpenAI stream started for model {}", params.model);

        Ok(text_stream_from_sse(response, |_event, data| {
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                return Ok(None);
            }

            let value: Value = match serde_json::from_str(data) {
                Ok(value) => value,
                Err(e) => {
                    // A malformed unit is skipped, not fatal.
                    log::warn!("Skipping malformed OpenAI SSE data: {}", e);
                    return Ok(None);
                }
            };
            Ok(value
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string))
        }))
    }

    fn known_models(&self) -> Vec<(&'static str, u32)> {
        vec![
            ("gpt-4o", 128_000),
            ("gpt-4o-mini", 128_000),
            ("gpt-4-turbo", 128_000),
            ("gpt-4", 8_192),
            ("gpt-3.5-turbo", 16_385),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> GenerationParams {
        GenerationParams::new("gpt-4o-mini")
    }

    #[tokio::test]
    async fn generate_extracts_flat_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello there"}}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
        let text = backend
            .generate(&[Message::user("hi")], &params())
            .await
            .unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn generate_maps_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("sk-bad").with_base_url(server.uri());
        let err = backend
            .generate(&[Message::user("hi")], &params())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn stream_skips_malformed_data_units() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: this is not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &params())
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hello");
    }

    #[tokio::test]
    async fn stream_yields_deltas_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = OpenAiBackend::new("sk-test").with_base_url(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &params())
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hello");
    }
}
