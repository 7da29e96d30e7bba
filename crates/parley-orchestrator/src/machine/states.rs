//! Turn states - the lifecycle of one conversation's turn loop.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a conversation's turn loop.
///
/// Exactly one generation may be in flight per conversation; the state
/// machine is what enforces it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Created but not yet handed its initial prompt.
    AwaitingFirstMessage,

    /// Idle between turns; the next participant may be invoked.
    AwaitingTurn,

    /// A backend call for the current participant is in flight.
    Generating,

    /// The conversation was ended. Terminal.
    Ended,
}

impl Default for TurnState {
    fn default() -> Self {
        TurnState::AwaitingFirstMessage
    }
}

impl TurnState {
    /// Terminal states accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Whether a new turn may start from this state.
    pub fn can_generate(&self) -> bool {
        matches!(self, Self::AwaitingTurn)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AwaitingFirstMessage => "Waiting for initial prompt",
            Self::AwaitingTurn => "Ready for next turn",
            Self::Generating => "Generating response",
            Self::Ended => "Ended",
        }
    }
}
