use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Local;

use super::store::KvStore;
use crate::models::conversation::fresh_conversation_id;
use crate::models::{ConversationIndex, Message};

const KEY_MESSAGES: &str = "messages";
const KEY_HISTORY: &str = "conversation_history";
const KEY_CURRENT: &str = "current_conversation";

/// Everything the conversation store persists.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConversations {
    pub index: ConversationIndex,
    pub active_id: String,
    /// Transcript of the active conversation; mirrors `index[active_id]`.
    pub messages: Vec<Message>,
}

impl StoredConversations {
    /// An empty index with a freshly stamped active id.
    pub fn fresh() -> Self {
        Self {
            index: ConversationIndex::new(),
            active_id: fresh_conversation_id(Local::now(), |_| false),
            messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    store: KvStore,
}

impl ConversationStore {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Never fails: an unreadable store yields an empty index and a fresh pointer.
    pub async fn load(&self) -> StoredConversations {
        match self.try_load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to load chat history, starting fresh: {:#}", e);
                StoredConversations::fresh()
            }
        }
    }

    async fn try_load(&self) -> Result<StoredConversations> {
        let entries = self.store.snapshot().await?;

        let mut index: ConversationIndex = decode(&entries, KEY_HISTORY)?.unwrap_or_default();
        let stored_messages: Vec<Message> = decode(&entries, KEY_MESSAGES)?.unwrap_or_default();
        let active_id: Option<String> = decode(&entries, KEY_CURRENT)?;

        let Some(active_id) = active_id else {
            let mut fresh = StoredConversations::fresh();
            fresh.active_id = fresh_conversation_id(Local::now(), |c| index.contains(c));
            fresh.index = index;
            return Ok(fresh);
        };

        // The index entry wins over the redundant copy.
        let messages = match index.get(&active_id) {
            Some(messages) => messages.to_vec(),
            None => {
                if !stored_messages.is_empty() {
                    index.upsert(&active_id, stored_messages.clone());
                }
                stored_messages
            }
        };

        Ok(StoredConversations {
            index,
            active_id,
            messages,
        })
    }

    pub async fn save(
        &self,
        index: &ConversationIndex,
        active_id: &str,
        messages: &[Message],
    ) -> Result<()> {
        let entries = vec![
            (KEY_MESSAGES, serde_json::to_string(messages)?),
            (KEY_HISTORY, serde_json::to_string(index)?),
            (KEY_CURRENT, serde_json::to_string(active_id)?),
        ];
        self.store
            .set_many(entries)
            .await
            .with_context(|| format!("Failed to save chat history to {}", self.store.path().display()))
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    entries: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    entries
        .get(key)
        .map(|raw| serde_json::from_str(raw).with_context(|| format!("Corrupt `{}` entry", key)))
        .transpose()
}
