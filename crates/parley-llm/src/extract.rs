//! Typed extraction strategies over raw backend response JSON.
//!
//! A backend's non-streaming response may arrive in one of a few known
//! shapes. Rather than probing fields ad hoc, extraction runs a fixed,
//! ordered strategy list; each strategy either matches with text or
//! reports a typed miss. Only when every strategy misses does extraction
//! fail, carrying the unrecognized payload for diagnosis - it never
//! silently returns empty text.

use serde_json::Value;

/// The known response shapes, in priority order.
///
/// Priority when several shapes are present is the flat field first; this
/// ordering is deliberate and relied upon by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// `choices[0].message.content` - OpenAI-compatible flat text field.
    FlatChoices,
    /// `content[*].text` - a list of typed parts (Anthropic messages API).
    ContentParts,
    /// `candidates[0].content.parts[*].text` - nested candidate list (Gemini).
    Candidates,
    /// `message.content` - single nested message object (Ollama chat API).
    NestedMessage,
}

/// Outcome of one strategy against one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Matched(String),
    NoMatch,
}

pub const STRATEGY_ORDER: &[ExtractionStrategy] = &[
    ExtractionStrategy::FlatChoices,
    ExtractionStrategy::ContentParts,
    ExtractionStrategy::Candidates,
    ExtractionStrategy::NestedMessage,
];

impl ExtractionStrategy {
    /// Try this strategy against a raw response payload.
    pub fn apply(&self, value: &Value) -> Extraction {
        match self {
            ExtractionStrategy::FlatChoices => {
                match value
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("message"))
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
                {
                    Some(text) => Extraction::Matched(text.to_string()),
                    None => Extraction::NoMatch,
                }
            }
            ExtractionStrategy::ContentParts => {
                let parts = match value.get("content").and_then(|c| c.as_array()) {
                    Some(parts) => parts,
                    None => return Extraction::NoMatch,
                };
                let text: String = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect();
                if text.is_empty() {
                    Extraction::NoMatch
                } else {
                    Extraction::Matched(text)
                }
            }
            ExtractionStrategy::Candidates => {
                let parts = match value
                    .get("candidates")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("content"))
                    .and_then(|c| c.get("parts"))
                    .and_then(|p| p.as_array())
                {
                    Some(parts) => parts,
                    None => return Extraction::NoMatch,
                };
                let text: String = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect();
                if text.is_empty() {
                    Extraction::NoMatch
                } else {
                    Extraction::Matched(text)
                }
            }
            ExtractionStrategy::NestedMessage => {
                match value
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
                {
                    Some(text) => Extraction::Matched(text.to_string()),
                    None => Extraction::NoMatch,
                }
            }
        }
    }
}

/// Run the full strategy list in priority order.
///
/// Returns the first match, or `None` when every strategy misses; the
/// caller turns that into [`crate::error::BackendError::EmptyResponse`].
pub fn extract_text(value: &Value) -> Option<String> {
    for strategy in STRATEGY_ORDER {
        if let Extraction::Matched(text) = strategy.apply(value) {
            log::trace!("Response matched extraction strategy {:?}", strategy);
            return Some(text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_flat_choices_shape() {
        let value = json!({
            "choices": [{"message": {"role": "assistant", "content": "flat text"}}]
        });
        assert_eq!(extract_text(&value), Some("flat text".to_string()));
    }

    #[test]
    fn extracts_content_parts_shape() {
        let value = json!({
            "content": [
                {"type": "text", "text": "part one "},
                {"type": "text", "text": "part two"}
            ]
        });
        assert_eq!(extract_text(&value), Some("part one part two".to_string()));
    }

    #[test]
    fn extracts_candidates_shape() {
        let value = json!({
            "candidates": [
                {"content": {"parts": [{"text": "candidate text"}], "role": "model"}}
            ]
        });
        assert_eq!(extract_text(&value), Some("candidate text".to_string()));
    }

    #[test]
    fn extracts_nested_message_shape() {
        let value = json!({"message": {"role": "assistant", "content": "local text"}});
        assert_eq!(extract_text(&value), Some("local text".to_string()));
    }

    #[test]
    fn flat_field_wins_when_multiple_shapes_present() {
        let value = json!({
            "choices": [{"message": {"content": "from choices"}}],
            "candidates": [{"content": {"parts": [{"text": "from candidates"}]}}]
        });
        assert_eq!(extract_text(&value), Some("from choices".to_string()));
    }

    #[test]
    fn unknown_shape_yields_none() {
        let value = json!({"unexpected": {"stuff": true}});
        assert_eq!(extract_text(&value), None);
    }

    #[test]
    fn empty_parts_do_not_match() {
        let value = json!({"content": []});
        assert_eq!(extract_text(&value), None);
    }
}
