use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::models::{ApiErrorBody, CompletionChunk};
use crate::providers::types::StreamEvent;

enum Flow {
    Continue,
    Finished,
}

/// Forward the deltas of an OpenAI-style SSE body to `tx`.
///
/// Always terminates the sequence with one `Done` or `Error`, unless the
/// receiver goes away first.
pub async fn parse_sse_stream<S, B, E>(stream: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut byte_buf: Vec<u8> = Vec::new();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error(format!("Stream error: {}", e)))
                    .await;
                return;
            }
        };

        byte_buf.extend_from_slice(bytes.as_ref());

        // Keep an incomplete trailing code point for the next chunk
        let decoded = match std::str::from_utf8(&byte_buf) {
            Ok(s) => {
                let decoded = s.to_string();
                byte_buf.clear();
                decoded
            }
            Err(e) if e.error_len().is_some() => {
                let decoded = String::from_utf8_lossy(&byte_buf).into_owned();
                byte_buf.clear();
                decoded
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    continue;
                }
                let decoded = String::from_utf8_lossy(&byte_buf[..valid_up_to]).into_owned();
                byte_buf.drain(..valid_up_to);
                decoded
            }
        };

        buffer.push_str(&decoded.replace("\r\n", "\n"));

        while let Some(event_end) = buffer.find("\n\n") {
            let event_text = buffer[..event_end].to_string();
            buffer.drain(..event_end + 2);

            if let Flow::Finished = process_event(&event_text, &tx).await {
                return;
            }
        }
    }

    // Trailing event without the blank-line terminator
    if !buffer.trim().is_empty() {
        if let Flow::Finished = process_event(&buffer, &tx).await {
            return;
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
}

async fn process_event(event_text: &str, tx: &mpsc::Sender<StreamEvent>) -> Flow {
    for line in event_text.lines() {
        let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };

        if payload.trim() == "[DONE]" {
            let _ = tx.send(StreamEvent::Done).await;
            return Flow::Finished;
        }

        if let Ok(err) = serde_json::from_str::<ApiErrorBody>(payload) {
            let _ = tx.send(StreamEvent::Error(err.error.message)).await;
            return Flow::Finished;
        }

        match serde_json::from_str::<CompletionChunk>(payload) {
            Ok(chunk) => {
                if let Some(choice) = chunk.choices.into_iter().next() {
                    let content = choice.delta.content.unwrap_or_default();
                    if tx.send(StreamEvent::Token(content)).await.is_err() {
                        // receiver dropped
                        return Flow::Finished;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to parse SSE data: {}", e);
            }
        }
    }
    Flow::Continue
}
