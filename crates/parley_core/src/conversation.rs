//! Conversation aggregate - ordered participants, append-only messages,
//! rotating turn index, cumulative accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::participant::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Ended,
}

/// A multi-participant conversation.
///
/// Mutated only by the turn orchestrator: messages are appended, the turn
/// index advances modulo the participant count, and totals accumulate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<Participant>,
    pub messages: Vec<Message>,
    pub current_turn: usize,
    pub status: ConversationStatus,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation from an initial prompt and participant list.
    /// The prompt becomes message 0; the turn index starts at 0.
    pub fn new(initial_prompt: impl Into<String>, participants: Vec<Participant>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participants,
            messages: vec![Message::user(initial_prompt)],
            current_turn: 0,
            status: ConversationStatus::Active,
            total_tokens: 0,
            total_cost: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The participant whose turn it currently is.
    pub fn current_participant(&self) -> &Participant {
        // current_turn is kept in range by advance_turn; the modulo guards
        // histories loaded from a store with a shrunk participant list.
        &self.participants[self.current_turn % self.participants.len()]
    }

    /// Append a message, maintaining the totals invariant.
    pub fn push_message(&mut self, message: Message) {
        self.total_tokens += u64::from(message.tokens);
        self.total_cost += message.cost;
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Advance the turn index modulo the participant count.
    pub fn advance_turn(&mut self) {
        self.current_turn = (self.current_turn + 1) % self.participants.len();
        self.updated_at = Utc::now();
    }

    pub fn end(&mut self) {
        self.status = ConversationStatus::Ended;
        self.updated_at = Utc::now();
    }

    pub fn is_ended(&self) -> bool {
        self.status == ConversationStatus::Ended
    }

    pub fn summary(&self) -> ConversationSummary {
        let initial = self.messages.first().map(|m| m.content.as_str()).unwrap_or("");
        ConversationSummary {
            id: self.id,
            initial_prompt: truncate(initial, 100),
            message_count: self.messages.len(),
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing view of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub initial_prompt: String,
    pub message_count: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::BackendKind;

    fn two_participants() -> Vec<Participant> {
        vec![
            Participant::new(BackendKind::OpenAi, "gpt-4o-mini"),
            Participant::new(BackendKind::Anthropic, "claude-3-5-haiku-20241022"),
        ]
    }

    #[test]
    fn new_conversation_has_prompt_as_message_zero() {
        let conv = Conversation::new("Hello", two_participants());
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].content, "Hello");
        assert_eq!(conv.current_turn, 0);
        assert_eq!(conv.status, ConversationStatus::Active);
    }

    #[test]
    fn totals_track_message_sum() {
        let mut conv = Conversation::new("Hello", two_participants());
        conv.push_message(Message::assistant("a", "one", 10, 0.001));
        conv.push_message(Message::assistant("b", "two", 15, 0.002));

        let sum: u64 = conv.messages.iter().map(|m| u64::from(m.tokens)).sum();
        assert_eq!(conv.total_tokens, sum);
        assert!((conv.total_cost - 0.003).abs() < 1e-9);
    }

    #[test]
    fn turn_index_wraps_modulo_participants() {
        let mut conv = Conversation::new("Hello", two_participants());
        for _ in 0..3 {
            conv.advance_turn();
        }
        assert_eq!(conv.current_turn, 1);
    }

    #[test]
    fn summary_truncates_long_prompts() {
        let long = "x".repeat(300);
        let conv = Conversation::new(long, two_participants());
        let summary = conv.summary();
        assert_eq!(summary.initial_prompt.chars().count(), 100);
        assert!(summary.initial_prompt.ends_with("..."));
    }
}
