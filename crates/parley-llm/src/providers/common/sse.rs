//! Shared SSE -> [`TextStream`] adapter.
//!
//! This is the discrete-message framing: each SSE event arrives as one
//! transport unit, so no boundary buffering is needed here.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;

use crate::error::{BackendError, Result};
use crate::provider::TextStream;

/// Convert an SSE HTTP [`Response`] into a [`TextStream`].
///
/// `handler` receives the SSE event name and data payload for each event:
/// - `Ok(Some(fragment))` emits a text fragment
/// - `Ok(None)` skips the event
/// - `Err(_)` surfaces a stream error (mapped to `BackendError::Stream`)
pub fn text_stream_from_sse<H>(response: Response, mut handler: H) -> TextStream
where
    H: FnMut(&str, &str) -> Result<Option<String>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| BackendError::Stream(e.to_string()))?;
            handler(event.event.as_str(), event.data.as_str()).map_err(to_stream_error)
        })
        .filter_map(|result| async move {
            match result {
                Ok(Some(fragment)) => Some(Ok(fragment)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        });

    Box::pin(stream)
}

fn to_stream_error(err: BackendError) -> BackendError {
    match err {
        BackendError::Stream(msg) => BackendError::Stream(msg),
        other => BackendError::Stream(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn sse_response(body: &str) -> Response {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(&mock_server)
            .await;

        reqwest::Client::new()
            .get(format!("{}/sse", mock_server.uri()))
            .send()
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn filters_skipped_events_and_passes_data() {
        let body = concat!(
            "event: token\n",
            "data: hello\n",
            "\n",
            "event: token\n",
            "data: skip\n",
            "\n",
        );
        let response = sse_response(body).await;

        let mut stream = text_stream_from_sse(response, |_event, data| {
            if data == "skip" {
                return Ok(None);
            }
            Ok(Some(data.to_string()))
        });

        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.expect("fragment"));
        }
        assert_eq!(out, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn handler_errors_become_stream_errors() {
        let body = concat!("data: boom\n", "\n");
        let response = sse_response(body).await;

        let mut stream = text_stream_from_sse(response, |_event, _data| {
            Err(BackendError::InvalidRequest("boom".to_string()))
        });

        let item = stream.next().await.expect("one item");
        match item {
            Err(BackendError::Stream(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }
}
