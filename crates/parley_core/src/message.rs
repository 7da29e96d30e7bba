//! Message types - the append-only unit of conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire-level role string used by backend APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message.
///
/// Messages are append-only: an "edit" is expressed as a new message or a
/// per-call substitution, never as a mutation of an existing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Display name of the author (participant name, or "User").
    pub author: String,
    pub content: String,
    /// Tokens attributed to this message (input + output for generated ones).
    pub tokens: u32,
    /// Cost in USD attributed to this message.
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A user-authored message. Carries no token/cost accounting of its own.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            author: "User".to_string(),
            content: content.into(),
            tokens: 0,
            cost: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// A backend-generated message with its token and cost accounting.
    pub fn assistant(author: impl Into<String>, content: impl Into<String>, tokens: u32, cost: f64) -> Self {
        Self {
            role: Role::Assistant,
            author: author.into(),
            content: content.into(),
            tokens,
            cost,
            timestamp: Utc::now(),
        }
    }
}
