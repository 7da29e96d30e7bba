//! Turn transitions - the event-driven FSM behind one conversation.

use thiserror::Error;

use super::events::TurnEvent;
use super::states::TurnState;

#[derive(Error, Debug, Clone)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} with event {event}")]
    InvalidTransition { from: TurnState, event: String },

    #[error("Turn machine is in terminal state: {0:?}")]
    TerminalState(TurnState),
}

/// One applied transition.
#[derive(Debug, Clone)]
pub struct TurnTransition {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub changed: bool,
}

/// Per-conversation state machine.
///
/// Events outside the transition table leave the state unchanged; callers
/// that need strictness check `can_transition` or the state first.
#[derive(Debug, Clone)]
pub struct TurnMachine {
    current_state: TurnState,
    history: Vec<TurnTransition>,
    max_history: usize,
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnMachine {
    pub fn new() -> Self {
        Self {
            current_state: TurnState::AwaitingFirstMessage,
            history: Vec::new(),
            max_history: 50,
        }
    }

    pub fn with_state(state: TurnState) -> Self {
        Self {
            current_state: state,
            history: Vec::new(),
            max_history: 50,
        }
    }

    pub fn state(&self) -> &TurnState {
        &self.current_state
    }

    pub fn history(&self) -> &[TurnTransition] {
        &self.history
    }

    /// Apply an event, recording the transition.
    pub fn handle_event(&mut self, event: TurnEvent) -> TurnTransition {
        let old_state = self.current_state.clone();
        let new_state = self.compute_next_state(&old_state, &event);
        let changed = old_state != new_state;

        if changed {
            log::debug!(
                "Turn state: {:?} -> {:?} on {}",
                old_state,
                new_state,
                event.name()
            );
        }

        self.current_state = new_state.clone();

        let transition = TurnTransition {
            from: old_state,
            to: new_state,
            event,
            changed,
        };

        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        transition
    }

    fn compute_next_state(&self, state: &TurnState, event: &TurnEvent) -> TurnState {
        use TurnEvent::*;
        use TurnState::*;

        match (state, event) {
            (AwaitingFirstMessage, ConversationStarted) => AwaitingTurn,

            (AwaitingTurn, AdvanceRequested) => Generating,

            // Success and failure both return to idle: a failed turn leaves
            // the history untouched and the same participant up next.
            (Generating, GenerationSucceeded) => AwaitingTurn,
            (Generating, GenerationFailed { .. }) => AwaitingTurn,

            (Ended, _) => Ended,
            (_, EndRequested) => Ended,

            // No transition.
            _ => state.clone(),
        }
    }

    pub fn can_transition(&self, event: &TurnEvent) -> bool {
        let next = self.compute_next_state(&self.current_state, event);
        next != self.current_state
    }
}
