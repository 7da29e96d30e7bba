//! Streamed turn protocol - the event sequence emitted by a streaming turn.
//!
//! The shape is transport-agnostic; a host serializes events to SSE, a
//! websocket, or a channel as it sees fit.

use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;

/// Events emitted while one participant's turn streams.
///
/// Order is always: one `Metadata`, zero or more `ContentDelta`, then a
/// single terminal `Completed` or `Failed`. The conversation is only
/// mutated when `Completed` is emitted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Metadata {
        participant: String,
        model: String,
        timestamp: DateTime<Utc>,
    },
    ContentDelta {
        text: String,
    },
    Completed {
        full_text: String,
        tokens: u32,
        cost: f64,
    },
    Failed {
        error: String,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Failed { .. })
    }
}

pub type TurnEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = StreamEvent::ContentDelta { text: "hi".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_delta");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn terminal_events() {
        assert!(StreamEvent::Failed { error: "x".into() }.is_terminal());
        assert!(!StreamEvent::ContentDelta { text: "x".into() }.is_terminal());
    }
}
