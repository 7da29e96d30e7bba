//! Boundary-buffered framing for newline-delimited JSON streams.
//!
//! Some backends (Gemini REST streaming, Ollama) emit one JSON record per
//! line over a raw byte stream. Record boundaries do not align with
//! transport reads: a record may be split across reads, or several records
//! may arrive in one. The framer buffers bytes and releases only complete
//! lines; a trailing partial line stays buffered until a later read (or
//! end of stream) completes it.

use bytes::{Buf, BytesMut};

#[derive(Default)]
pub struct NdjsonFramer {
    buf: BytesMut,
}

impl NdjsonFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport read; returns every complete line it unlocked.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos);
            self.buf.advance(1); // the newline itself
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }

        lines
    }

    /// Drain whatever remains after the transport ends. A final record
    /// without a trailing newline is still a complete unit at EOF.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
