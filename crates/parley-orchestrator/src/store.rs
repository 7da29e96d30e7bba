//! Conversation storage port.
//!
//! The orchestrator persists through this trait; the in-memory
//! implementation backs tests and single-process hosts, and a host can
//! supply a durable one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::{Conversation, ConversationSummary};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Conversation {0} not found")]
    NotFound(Uuid),

    #[error("Conversation {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Storage failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage port for conversation records.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: Conversation) -> StoreResult<()>;

    async fn load(&self, id: Uuid) -> StoreResult<Conversation>;

    /// Replace the stored record. The orchestrator is the single writer
    /// per conversation, so last-write-wins is sufficient.
    async fn update(&self, conversation: Conversation) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<ConversationSummary>>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(&self, conversation: Conversation) -> StoreResult<()> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(StoreError::AlreadyExists(conversation.id));
        }
        conversations.insert(conversation.id, conversation);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> StoreResult<Conversation> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, conversation: Conversation) -> StoreResult<()> {
        let mut conversations = self.conversations.write().await;
        if !conversations.contains_key(&conversation.id) {
            return Err(StoreError::NotFound(conversation.id));
        }
        conversations.insert(conversation.id, conversation);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.conversations
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> =
            conversations.values().map(Conversation::summary).collect();
        // Most recently updated first.
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
