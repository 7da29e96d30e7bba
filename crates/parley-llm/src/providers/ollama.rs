//! Ollama adapter for local models. No credential, zero cost.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use parley_core::Message;

use crate::error::{BackendError, Result};
use crate::extract::extract_text;
use crate::provider::{BackendProvider, GenerationParams, TextStream};

use super::common::ndjson::text_stream_from_ndjson;
use super::openai_style_messages;

pub struct OllamaBackend {
    client: Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn body(&self, messages: &[Message], params: &GenerationParams, stream: bool) -> Value {
        json!({
            "model": params.model,
            "messages": openai_style_messages(messages, &params.system_prompt),
            "stream": stream,
            "options": {"temperature": params.temperature},
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    BackendError::Configuration(format!(
                        "Cannot connect to Ollama at {}. Is `ollama serve` running?",
                        self.base_url
                    ))
                } else {
                    BackendError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(BackendError::from_status(status, format!("Ollama: {}", text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendProvider for OllamaBackend {
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

        log::debug!("Ollama stream started for model {}", params.model);

        Ok(text_stream_from_ndjson(response, |line| {
            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Skipping malformed Ollama record: {}", e);
                    return Ok(None);
                }
            };
            Ok(value
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_extracts_nested_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "local hello"}
            })))
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(server.uri());
        let text = backend
            .generate(&[Message::user("hi")], &GenerationParams::new("llama2"))
            .await
            .unwrap();
        assert_eq!(text, "local hello");
    }

    #[tokio::test]
    async fn stream_concatenates_ndjson_fragments() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"message\":{\"content\":\"a\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"b\"},\"done\":false}\n",
            "{\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-ndjson")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = OllamaBackend::new(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &GenerationParams::new("llama2"))
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "ab");
    }
}
