use crate::models::{ConversationIndex, Message};
use crate::services::conversation_store::StoredConversations;
use crate::services::preferences::Preferences;

/// State of one chat session. Built once at startup and handed to every handler.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub active_id: String,
    /// Transcript of the active conversation.
    pub messages: Vec<Message>,
    pub index: ConversationIndex,
    /// Cached summary of `messages`; empty when stale or never generated.
    pub summary: String,
    pub preferences: Preferences,
}

impl SessionState {
    pub fn new(stored: StoredConversations, preferences: Preferences) -> Self {
        Self {
            active_id: stored.active_id,
            messages: stored.messages,
            index: stored.index,
            summary: String::new(),
            preferences,
        }
    }

    /// The active id is either indexed with a matching transcript, or fresh and empty.
    pub fn pointer_is_consistent(&self) -> bool {
        match self.index.get(&self.active_id) {
            Some(messages) => messages == self.messages.as_slice(),
            None => self.messages.is_empty(),
        }
    }
}
