//! Boundary-buffered NDJSON -> [`TextStream`] adapter.
//!
//! The byte-stream framing: record boundaries may be split across or merged
//! into transport reads, so lines are assembled by [`NdjsonFramer`] before
//! the handler ever sees them.

use async_stream::stream;
use futures_util::StreamExt;
use reqwest::Response;

use crate::error::{BackendError, Result};
use crate::framing::NdjsonFramer;
use crate::provider::TextStream;

/// Convert a newline-delimited JSON HTTP [`Response`] into a [`TextStream`].
///
/// `handler` receives each complete line:
/// - `Ok(Some(fragment))` emits a text fragment
/// - `Ok(None)` skips the line (e.g. records without text)
/// - `Err(_)` surfaces a stream error for that unit
pub fn text_stream_from_ndjson<H>(response: Response, mut handler: H) -> TextStream
where
    H: FnMut(&str) -> Result<Option<String>> + Send + 'static,
{
    let stream = stream! {
        let mut framer = NdjsonFramer::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(BackendError::Stream(err.to_string()));
                    continue;
                }
            };
            for line in framer.push(&chunk) {
                match handler(&line) {
                    Ok(Some(fragment)) => yield Ok(fragment),
                    Ok(None) => {}
                    Err(err) => yield Err(to_stream_error(err)),
                }
            }
        }

        if let Some(line) = framer.finish() {
            match handler(&line) {
                Ok(Some(fragment)) => yield Ok(fragment),
                Ok(None) => {}
                Err(err) => yield Err(to_stream_error(err)),
            }
        }
    };

    Box::pin(stream)
}

fn to_stream_error(err: BackendError) -> BackendError {
    match err {
        BackendError::Stream(msg) => BackendError::Stream(msg),
        other => BackendError::Stream(other.to_string()),
    }
}
