//! Turn state machine
//!
//! FSM governing the single-writer turn loop of one conversation.

mod events;
mod states;
mod transitions;

pub use events::TurnEvent;
pub use states::TurnState;
pub use transitions::{TransitionError, TurnMachine, TurnTransition};
