//! parley-orchestrator - turn scheduling for multi-model conversations.
//!
//! Rotates turns across a conversation's participants, runs each turn
//! through the backend guard stack, accounts tokens and cost, and streams
//! results as a transport-agnostic event protocol.

pub mod budget;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod store;
pub mod stream;

pub use budget::{BudgetReport, TokenEstimator};
pub use error::{OrchestratorError, Result};
pub use machine::{TurnEvent, TurnMachine, TurnState, TurnTransition};
pub use orchestrator::TurnOrchestrator;
pub use store::{ConversationStore, MemoryStore, StoreError};
pub use stream::{StreamEvent, TurnEventStream};
