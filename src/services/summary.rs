use crate::models::{Message, Role};
use crate::providers::{ChatMessage, ChatRequest, CompletionProvider, GenerationParams};
use crate::session::SessionState;

pub const EMPTY_TRANSCRIPT: &str = "No conversation to summarize";

const SUMMARY_PREAMBLE: &str =
    "Please provide a brief summary of the following conversation in 2-3 sentences:\n\n";

const SUMMARY_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.5,
    max_tokens: 100,
    top_p: None,
};

/// Flatten a transcript into the single prompt sent for summarization.
pub fn build_summary_prompt(messages: &[Message]) -> String {
    let mut prompt = SUMMARY_PREAMBLE.to_string();
    for msg in messages {
        prompt.push_str(&format!("{}: {}\n", msg.role.label(), msg.content));
    }
    prompt
}

pub fn build_summary_request(api_key: &str, state: &SessionState) -> ChatRequest {
    ChatRequest {
        api_key: api_key.to_string(),
        model: state.preferences.model.id().to_string(),
        messages: vec![ChatMessage {
            role: Role::User,
            content: build_summary_prompt(&state.messages),
        }],
        params: SUMMARY_PARAMS,
    }
}

/// Summarize the active transcript.
///
/// Always returns displayable text. Only a successful call updates
/// `state.summary`; failures come back as a fallback message.
pub async fn summarize(
    provider: &dyn CompletionProvider,
    state: &mut SessionState,
    api_key: &str,
) -> String {
    if state.messages.is_empty() {
        return EMPTY_TRANSCRIPT.to_string();
    }

    let request = build_summary_request(api_key, state);
    match provider.send_message(request).await {
        Ok(response) => {
            tracing::debug!(model = %response.model, "Summary generated");
            state.summary = response.content.clone();
            response.content
        }
        Err(e) => {
            tracing::warn!("Summary request failed: {}", e);
            format!("Failed to generate summary: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{Script, ScriptedProvider};
    use crate::services::conversation_store::StoredConversations;
    use crate::services::preferences::Preferences;

    fn state_with(messages: Vec<Message>) -> SessionState {
        let mut state = SessionState::new(StoredConversations::fresh(), Preferences::default());
        state.messages = messages;
        state
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_summary_prompt(&[Message::user("Hi"), Message::assistant("Hello!")]);
        assert_eq!(
            prompt,
            "Please provide a brief summary of the following conversation in 2-3 sentences:\n\n\
             User: Hi\nAssistant: Hello!\n"
        );
    }

    #[tokio::test]
    async fn test_summary_is_stored_and_prompt_is_stable() {
        let mut state = state_with(vec![Message::user("Hi"), Message::assistant("Hello!")]);
        let provider = ScriptedProvider::new(Script::Reply("A greeting."));

        let first = summarize(&provider, &mut state, "key").await;
        let second = summarize(&provider, &mut state, "key").await;

        assert_eq!(first, "A greeting.");
        assert_eq!(second, first);
        assert_eq!(state.summary, "A greeting.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0].params.temperature, 0.5);
        assert_eq!(requests[0].params.max_tokens, 100);
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_returns_fallback() {
        let mut state = state_with(vec![Message::user("Hi")]);
        state.summary = "previous".to_string();
        let provider = ScriptedProvider::new(Script::Reject);

        let text = summarize(&provider, &mut state, "key").await;

        assert_eq!(
            text,
            "Failed to generate summary: Network error: connection refused"
        );
        assert_eq!(state.summary, "previous");
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_upstream() {
        let mut state = state_with(Vec::new());
        let provider = ScriptedProvider::new(Script::Reply("unused"));

        assert_eq!(summarize(&provider, &mut state, "key").await, EMPTY_TRANSCRIPT);
        assert!(provider.requests().is_empty());
    }
}
