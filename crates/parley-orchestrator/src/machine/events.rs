//! Turn events - what can happen to a conversation's turn loop.

use serde::{Deserialize, Serialize};

/// Events that drive turn-state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEvent {
    /// The conversation received its initial prompt.
    ConversationStarted,

    /// A turn was requested for the current participant.
    AdvanceRequested,

    /// The in-flight generation produced a committed message.
    GenerationSucceeded,

    /// The in-flight generation failed or was abandoned before commit.
    GenerationFailed { error: String },

    /// The conversation was ended.
    EndRequested,
}

impl TurnEvent {
    /// Short name used in transition errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::ConversationStarted => "conversation_started",
            TurnEvent::AdvanceRequested => "advance_requested",
            TurnEvent::GenerationSucceeded => "generation_succeeded",
            TurnEvent::GenerationFailed { .. } => "generation_failed",
            TurnEvent::EndRequested => "end_requested",
        }
    }
}
