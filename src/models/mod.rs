pub mod conversation;
pub mod message;

pub use conversation::ConversationIndex;
pub use message::{Message, Role};
