//! Core types and configuration for the parley conversation system.

pub mod config;
pub mod conversation;
pub mod message;
pub mod participant;
pub mod pricing;

pub use config::{OrchestratorConfig, ProviderConfigs, RuntimeOptions};
pub use conversation::{Conversation, ConversationStatus, ConversationSummary};
pub use message::{Message, Role};
pub use participant::{BackendKind, Participant};
