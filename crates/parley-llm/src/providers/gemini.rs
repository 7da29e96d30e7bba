//! Google Gemini REST adapter.
//!
//! Streaming uses `streamGenerateContent`, which returns newline-delimited
//! JSON rather than SSE, so fragments go through the boundary-buffered
//! NDJSON framing.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use parley_core::{Message, Role};

use crate::error::{BackendError, Result};
use crate::extract::extract_text;
use crate::provider::{BackendProvider, GenerationParams, TextStream};

use super::common::ndjson::text_stream_from_ndjson;

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn body(&self, messages: &[Message], params: &GenerationParams) -> Value {
        // Gemini uses "model" where others use "assistant", and takes the
        // system prompt as a separate systemInstruction field.
        let contents: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {"temperature": params.temperature},
        });
        if !params.system_prompt.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": params.system_prompt}]});
        }
        body
    }

    async fn post(&self, endpoint: &str, params: &GenerationParams, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{}", self.base_url, params.model, endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(BackendError::from_status(status, format!("Gemini: {}", text)));
        }
        Ok(response)
    }
}

/// Pull candidate text out of one streamed record, if any.
fn delta_from_record(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl BackendProvider for GeminiBackend {
    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<String> {
        let body = self.body(messages, params);
        let response = self.post("generateContent", params, &body).await?;
        let value: Value = response.json().await?;

        extract_text(&value).ok_or_else(|| BackendError::EmptyResponse(value.to_string()))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TextStream> {
        let body = self.body(messages, params);
        let response = self.post("streamGenerateContent?alt=jsonl", params, &body).await?;

        log::debug!("Gemini stream started for model {}", params.model);

        Ok(text_stream_from_ndjson(response, |line| {
            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(e) => {
                    // A malformed record is skipped, not fatal.
                    log::warn!("Skipping malformed Gemini record: {}", e);
                    return Ok(None);
                }
            };

            if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown Gemini error");
                return Err(BackendError::Stream(message.to_string()));
            }

            Ok(delta_from_record(&value))
        }))
    }

    fn known_models(&self) -> Vec<(&'static str, u32)> {
        vec![
            ("gemini-2.0-flash-exp", 1_000_000),
            ("gemini-1.5-pro", 2_000_000),
            ("gemini-1.5-flash", 1_000_000),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn delta_skips_records_without_text() {
        let value = serde_json::json!({"candidates": [{"finishReason": "STOP"}]});
        assert_eq!(delta_from_record(&value), None);
    }

    #[tokio::test]
    async fn generate_extracts_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "gemini says hi"}], "role": "model"}}]
            })))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("AIza-test").with_base_url(server.uri());
        let text = backend
            .generate(&[Message::user("hi")], &GenerationParams::new("gemini-1.5-flash"))
            .await
            .unwrap();
        assert_eq!(text, "gemini says hi");
    }

    #[tokio::test]
    async fn stream_parses_ndjson_records() {
        let server = MockServer::start().await;
        let body = concat!(
            "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n",
            "not json at all\n",
            "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-ndjson")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let backend = GeminiBackend::new("AIza-test").with_base_url(server.uri());
        let mut stream = backend
            .generate_stream(&[Message::user("hi")], &GenerationParams::new("gemini-1.5-flash"))
            .await
            .unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "Hello");
    }
}
