use tokio::sync::mpsc;

use super::conversation::ConversationManager;
use crate::providers::{ChatRequest, CompletionProvider, StreamEvent};
use crate::session::SessionState;

const STREAM_BUFFER: usize = 64;

/// Lifecycle of one exchange. Every send starts and ends at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Sending,
    Streaming,
    Committed,
    Failed,
}

/// Progress callbacks for the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent<'a> {
    Phase(StreamPhase),
    /// Everything received so far, in arrival order.
    Partial(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing changed.
    Ignored,
    Committed { reply: String },
    /// The exchange was rolled back; the transcript is as it was before the send.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub outcome: SendOutcome,
    /// Non-fatal persistence failures hit along the way.
    pub notices: Vec<String>,
}

/// Build a streaming request for the active transcript.
pub fn build_request(api_key: &str, state: &SessionState) -> ChatRequest {
    let prefs = &state.preferences;
    ChatRequest::from_transcript(
        api_key,
        prefs.model.id(),
        &state.messages,
        prefs.generation_params(),
    )
}

/// Send `text` and stream the reply into the active conversation.
///
/// The user message is appended in memory before the request goes out and is
/// only written together with the reply. On success the cached summary is
/// dropped; on any upstream error the user message is removed again and no
/// assistant text is kept.
pub async fn send_message<F>(
    provider: &dyn CompletionProvider,
    manager: &ConversationManager,
    state: &mut SessionState,
    api_key: &str,
    text: &str,
    mut on_event: F,
) -> SendReport
where
    F: FnMut(RenderEvent<'_>),
{
    let mut notices = Vec::new();

    if text.trim().is_empty() {
        return SendReport {
            outcome: SendOutcome::Ignored,
            notices,
        };
    }

    on_event(RenderEvent::Phase(StreamPhase::Sending));
    manager.append_user_message(state, text);

    let request = build_request(api_key, state);
    tracing::debug!(?request, "Starting stream");

    let result = run_stream(provider, request, &mut on_event).await;

    let outcome = match result {
        Ok(reply) => {
            if let Err(e) = manager.append_assistant_message(state, &reply).await {
                notices.push(e.to_string());
            }
            state.summary.clear();
            on_event(RenderEvent::Phase(StreamPhase::Committed));
            tracing::debug!(chars = reply.len(), "Stream committed");
            SendOutcome::Committed { reply }
        }
        Err(error) => {
            tracing::warn!("Stream failed: {}", error);
            manager.rollback_user_message(state);
            on_event(RenderEvent::Phase(StreamPhase::Failed));
            SendOutcome::Failed { error }
        }
    };

    on_event(RenderEvent::Phase(StreamPhase::Idle));
    SendReport { outcome, notices }
}

/// Drive the provider and the accumulator side by side on the current task.
async fn run_stream<F>(
    provider: &dyn CompletionProvider,
    request: ChatRequest,
    on_event: &mut F,
) -> Result<String, String>
where
    F: FnMut(RenderEvent<'_>),
{
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(STREAM_BUFFER);

    let producer = provider.stream_message(request, tx);

    let consumer = async move {
        let mut accumulated = String::new();
        let mut streaming = false;

        loop {
            match rx.recv().await {
                Some(StreamEvent::Token(token)) => {
                    if !streaming {
                        streaming = true;
                        on_event(RenderEvent::Phase(StreamPhase::Streaming));
                    }
                    accumulated.push_str(&token);
                    on_event(RenderEvent::Partial(&accumulated));
                }
                Some(StreamEvent::Done) | None => return Ok(accumulated),
                Some(StreamEvent::Error(error)) => return Err(error),
            }
        }
    };

    let (started, consumed) = tokio::join!(producer, consumer);
    started.map_err(|e| e.to_string())?;
    consumed
}
