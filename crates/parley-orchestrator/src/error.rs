//! Orchestrator error taxonomy.

use parley_llm::BackendError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("Conversation {0} already has a turn in progress")]
    TurnInProgress(Uuid),

    #[error("Conversation {0} has ended")]
    ConversationEnded(Uuid),

    #[error("A conversation needs at least one participant")]
    NoParticipants,

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(StoreError),

    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => OrchestratorError::ConversationNotFound(id),
            other => OrchestratorError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
