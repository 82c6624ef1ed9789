use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;

use super::models::*;
use super::stream::parse_sse_stream;
use crate::providers::traits::CompletionProvider;
use crate::providers::types::{
    ChatMessage, ChatRequest, ChatResponse, ProviderError, StreamEvent,
};

/// Groq's OpenAI-compatible chat-completions endpoint.
pub struct GroqProvider {
    client: Client,
    base_url: String,
}

impl GroqProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
        messages
            .iter()
            .map(|msg| WireMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            })
            .collect()
    }

    fn build_body(request: &ChatRequest, stream: bool) -> CompletionBody<'_> {
        CompletionBody {
            model: &request.model,
            messages: Self::build_messages(&request.messages),
            stream,
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            top_p: request.params.top_p,
        }
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    fn retry_after(response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// POST the request and map non-success statuses onto `ProviderError`.
    async fn post(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = Self::build_body(request, stream);
        tracing::debug!(model = %body.model, stream, messages = body.messages.len(), "POST chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth("Invalid API key".to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Self::retry_after(&response),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self.post(&request, false).await?;

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("No content in response".to_string())
            })?;

        Ok(ChatResponse {
            content,
            model: completion.model.unwrap_or(request.model),
        })
    }

    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let response = self.post(&request, true).await?;
        parse_sse_stream(response.bytes_stream(), tx).await;
        Ok(())
    }
}
