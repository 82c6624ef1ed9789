pub mod chat;
pub mod conversation;
pub mod conversation_store;
pub mod export;
pub mod preferences;
pub mod store;
pub mod summary;

pub use conversation::{ConversationError, ConversationManager};
pub use conversation_store::ConversationStore;
pub use preferences::PreferenceStore;
pub use store::KvStore;
