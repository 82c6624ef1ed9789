//! In-process provider that replays canned responses and records requests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::CompletionProvider;
use super::types::{ChatRequest, ChatResponse, ProviderError, StreamEvent};

pub enum Script {
    /// Emit these fragments, then `Done`.
    Fragments(Vec<&'static str>),
    /// Emit these fragments, then fail mid-stream.
    FailAfter(Vec<&'static str>),
    /// Emit these fragments, then never finish.
    StallAfter(Vec<&'static str>),
    /// Refuse the request before any fragment.
    Reject,
    Reply(&'static str),
}

pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: ChatRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        self.record(request);
        match &self.script {
            Script::Reply(text) => Ok(ChatResponse {
                content: text.to_string(),
                model,
            }),
            Script::Fragments(parts) => Ok(ChatResponse {
                content: parts.concat(),
                model,
            }),
            Script::FailAfter(_) | Script::StallAfter(_) | Script::Reject => {
                Err(ProviderError::Network("connection refused".to_string()))
            }
        }
    }

    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        self.record(request);
        let (parts, fail) = match &self.script {
            Script::Reject => {
                return Err(ProviderError::Auth("Invalid API key".to_string()));
            }
            Script::StallAfter(parts) => {
                for part in parts {
                    let _ = tx.send(StreamEvent::Token(part.to_string())).await;
                }
                std::future::pending::<()>().await;
                return Ok(());
            }
            Script::Reply(text) => (vec![*text], false),
            Script::Fragments(parts) => (parts.clone(), false),
            Script::FailAfter(parts) => (parts.clone(), true),
        };
        for part in parts {
            let _ = tx.send(StreamEvent::Token(part.to_string())).await;
        }
        let last = if fail {
            StreamEvent::Error("Stream error: connection reset".to_string())
        } else {
            StreamEvent::Done
        };
        let _ = tx.send(last).await;
        Ok(())
    }
}
