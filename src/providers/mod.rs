pub mod groq;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod scripted;

pub use traits::CompletionProvider;
pub use types::{ChatMessage, ChatRequest, ChatResponse, GenerationParams, ProviderError, StreamEvent};
