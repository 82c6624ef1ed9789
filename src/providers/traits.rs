use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, ChatResponse, ProviderError};
use super::StreamEvent;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Single-shot completion, used for summaries.
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streamed completion. Fragments are sent on `tx` in arrival order and the
    /// sequence ends with exactly one `Done` or `Error`. An `Err` return means
    /// the stream never started.
    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError>;
}
