use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::message::Message;

const ID_PREFIX: &str = "Conversation-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

/// Conversations keyed by id, kept in insertion order for display.
///
/// Serialized as a list of `{id, messages}` entries; duplicate ids in stored
/// data collapse onto the first position with the last transcript winning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Conversation>", into = "Vec<Conversation>")]
pub struct ConversationIndex {
    entries: Vec<Conversation>,
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&[Message]> {
        self.entries
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.messages.as_slice())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|c| c.id == id)
    }

    /// Insert or replace the transcript for `id`. Existing ids keep their position.
    pub fn upsert(&mut self, id: &str, messages: Vec<Message>) {
        match self.entries.iter_mut().find(|c| c.id == id) {
            Some(entry) => entry.messages = messages,
            None => self.entries.push(Conversation {
                id: id.to_string(),
                messages,
            }),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Vec<Message>> {
        let pos = self.entries.iter().position(|c| c.id == id)?;
        Some(self.entries.remove(pos).messages)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<Conversation>> for ConversationIndex {
    fn from(entries: Vec<Conversation>) -> Self {
        let mut index = ConversationIndex::new();
        for conv in entries {
            index.upsert(&conv.id, conv.messages);
        }
        index
    }
}

impl From<ConversationIndex> for Vec<Conversation> {
    fn from(index: ConversationIndex) -> Self {
        index.entries
    }
}

/// Build a conversation id from a timestamp at second granularity.
pub fn conversation_id_at(now: DateTime<Local>) -> String {
    format!("{}{}", ID_PREFIX, now.format("%Y%m%d-%H%M%S"))
}

/// Pick a fresh id for `now`, suffixing `-2`, `-3`, ... while `taken` reports a clash.
pub fn fresh_conversation_id(now: DateTime<Local>, taken: impl Fn(&str) -> bool) -> String {
    let base = conversation_id_at(now);
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_conversation_id_format() {
        assert_eq!(
            conversation_id_at(fixed_time()),
            "Conversation-20240309-140507"
        );
    }

    #[test]
    fn test_fresh_id_avoids_taken() {
        let taken = ["Conversation-20240309-140507", "Conversation-20240309-140507-2"];
        let id = fresh_conversation_id(fixed_time(), |c| taken.contains(&c));
        assert_eq!(id, "Conversation-20240309-140507-3");
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut index = ConversationIndex::new();
        index.upsert("a", vec![Message::user("1")]);
        index.upsert("b", vec![]);
        index.upsert("a", vec![Message::user("1"), Message::assistant("2")]);

        assert_eq!(index.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(index.get("a").unwrap().len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut index = ConversationIndex::new();
        index.upsert("a", vec![Message::user("hi")]);
        assert_eq!(index.remove("a"), Some(vec![Message::user("hi")]));
        assert!(index.remove("a").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_deserialize_collapses_duplicates() {
        let json = r#"[
            {"id": "a", "messages": []},
            {"id": "b", "messages": []},
            {"id": "a", "messages": [{"role": "user", "content": "late"}]}
        ]"#;
        let index: ConversationIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap(), &[Message::user("late")]);
    }
}
