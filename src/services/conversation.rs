use chrono::Local;
use thiserror::Error;

use super::conversation_store::ConversationStore;
use crate::models::conversation::fresh_conversation_id;
use crate::models::{Message, Role};
use crate::session::SessionState;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// The in-memory change went through; only the write failed.
    #[error("Failed to persist conversations: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub id: String,
    pub message_count: usize,
    pub active: bool,
}

/// Mutates the conversation side of `SessionState` and persists every committed change.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    store: ConversationStore,
}

impl ConversationManager {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }

    pub async fn new_conversation(&self, state: &mut SessionState) -> Result<(), ConversationError> {
        self.reset_active(state);
        self.persist(state).await
    }

    pub async fn switch_conversation(
        &self,
        state: &mut SessionState,
        id: &str,
    ) -> Result<(), ConversationError> {
        let messages = state
            .index
            .get(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?
            .to_vec();

        state.active_id = id.to_string();
        state.messages = messages;
        state.summary.clear();
        self.persist(state).await
    }

    /// Deleting the active conversation starts a new one in its place.
    pub async fn delete_conversation(
        &self,
        state: &mut SessionState,
        id: &str,
    ) -> Result<(), ConversationError> {
        let removed = state.index.remove(id).is_some();
        let is_active = id == state.active_id;
        if !removed && !is_active {
            return Err(ConversationError::NotFound(id.to_string()));
        }

        if is_active {
            self.reset_active(state);
        }
        self.persist(state).await
    }

    pub async fn delete_all_conversations(
        &self,
        state: &mut SessionState,
    ) -> Result<(), ConversationError> {
        state.index.clear();
        self.reset_active(state);
        self.persist(state).await
    }

    pub fn list_conversations(&self, state: &SessionState) -> Vec<ConversationEntry> {
        state
            .index
            .iter()
            .map(|c| ConversationEntry {
                id: c.id.clone(),
                message_count: c.messages.len(),
                active: c.id == state.active_id,
            })
            .collect()
    }

    /// Optimistically add the user's turn to the in-memory transcript.
    ///
    /// Nothing is written and the index is left alone: the turn reaches the
    /// store together with its reply in `append_assistant_message`, so an
    /// interrupted send never leaves an unanswered user turn on disk.
    pub fn append_user_message(&self, state: &mut SessionState, text: &str) {
        state.messages.push(Message::user(text));
    }

    /// Commit a reply. The pending user turn and the reply are saved in one write.
    pub async fn append_assistant_message(
        &self,
        state: &mut SessionState,
        text: &str,
    ) -> Result<(), ConversationError> {
        state.messages.push(Message::assistant(text));
        state.index.upsert(&state.active_id, state.messages.clone());
        self.persist(state).await
    }

    /// Undo an uncommitted `append_user_message`.
    pub fn rollback_user_message(&self, state: &mut SessionState) {
        if state.messages.last().map(|m| m.role) == Some(Role::User) {
            state.messages.pop();
        }
    }

    fn reset_active(&self, state: &mut SessionState) {
        let previous = state.active_id.clone();
        state.active_id = fresh_conversation_id(Local::now(), |candidate| {
            candidate == previous || state.index.contains(candidate)
        });
        state.messages.clear();
        state.summary.clear();
    }

    async fn persist(&self, state: &SessionState) -> Result<(), ConversationError> {
        self.store
            .save(&state.index, &state.active_id, &state.messages)
            .await
            .map_err(|e| {
                tracing::error!("Failed to save chat history: {:#}", e);
                ConversationError::Persistence(e)
            })
    }
}
