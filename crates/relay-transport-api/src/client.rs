//! Direct HTTP API provider invocation, streaming tokens into a channel.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tracing::debug;

use crate::error::{ApiError, ApiResult};

/// One token-stream event from a running completion.
#[derive(Debug, Clone)]
pub enum ApiEvent {
    /// A chunk of generated text.
    TextDelta(String),
    /// The stream closed normally.
    Done,
    /// The stream ended in error, or was cancelled.
    Failed(String),
}

/// A direct HTTP API provider call.
///
/// Each instance targets one `{baseURL}/chat/completions` endpoint with
/// bearer auth from a pre-resolved API key. Only one request may be in
/// flight per client at a time.
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    provider: String,
    model: String,
    in_flight: Arc<AsyncMutex<Option<oneshot::Sender<()>>>>,
}

impl ApiClient {
    /// Builds a client for `provider`/`model` against `base_url`.
    /// `api_key` is the already-resolved credential value (not the env
    /// var name).
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            provider: provider.into(),
            model: model.into(),
            in_flight: Arc::new(AsyncMutex::new(None)),
        }
    }

    /// Posts `prompt_text` to the chat-completions endpoint and returns a
    /// channel of streamed events. The channel closes after `Done` or
    /// `Failed`.
    pub async fn complete(&self, prompt_text: &str) -> ApiResult<mpsc::UnboundedReceiver<ApiEvent>> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ApiError::MissingApiKey(self.provider.clone()))?;

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        {
            let mut guard = self.in_flight.lock().await;
            if guard.is_some() {
                return Err(ApiError::AlreadyRunning);
            }
            *guard = Some(cancel_tx);
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt_text }],
            "stream": true,
        });

        debug!(provider = %self.provider, model = %self.model, %url, "starting api completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                *self.in_flight.lock().await = None;
                return Err(ApiError::Request(e));
            },
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            *self.in_flight.lock().await = None;
            return Err(ApiError::Status { status, body });
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let provider = self.provider.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            'outer: loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        let _ = event_tx.send(ApiEvent::Failed("cancelled".to_string()));
                        break 'outer;
                    }
                    chunk = stream.next() => {
                        match chunk {
                            Some(Ok(bytes)) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));
                                while let Some(idx) = buffer.find("\n\n") {
                                    let event_data = buffer[..idx].to_string();
                                    let rest_start = idx.checked_add(2).unwrap_or(buffer.len());
                                    buffer = buffer[rest_start..].to_string();
                                    if emit_sse_event(&event_data, &event_tx) {
                                        break 'outer;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                let _ = event_tx.send(ApiEvent::Failed(e.to_string()));
                                break 'outer;
                            }
                            None => {
                                let _ = event_tx.send(ApiEvent::Done);
                                break 'outer;
                            }
                        }
                    }
                }
            }

            debug!(provider = %provider, "api completion stream closed");
            *in_flight.lock().await = None;
        });

        Ok(event_rx)
    }

    /// Cancels the in-flight request, if any. Idempotent.
    pub async fn cancel(&self) -> ApiResult<()> {
        if let Some(tx) = self.in_flight.lock().await.take() {
            let _ = tx.send(());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Parses one `\n\n`-delimited SSE event and emits the resulting
/// `ApiEvent`s. Returns `true` if the stream should stop (a `[DONE]`
/// sentinel was seen).
fn emit_sse_event(event_data: &str, event_tx: &mpsc::UnboundedSender<ApiEvent>) -> bool {
    for line in event_data.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data.trim() == "[DONE]" {
            let _ = event_tx.send(ApiEvent::Done);
            return true;
        }
        if let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) {
            if let Some(choice) = parsed.choices.first() {
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        let _ = event_tx.send(ApiEvent::TextDelta(content.clone()));
                    }
                }
            }
        }
    }
    false
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_rejected_before_any_request() {
        let client = ApiClient::new("https://api.example.com/v1", None, "haiku", "claude-haiku");
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::MissingApiKey(p) if p == "haiku"));
    }

    #[tokio::test]
    async fn cancel_without_a_request_in_flight_is_a_no_op() {
        let client = ApiClient::new(
            "https://api.example.com/v1",
            Some("key".to_string()),
            "haiku",
            "claude-haiku",
        );
        client.cancel().await.unwrap();
    }

    #[test]
    fn sse_done_sentinel_is_recognized() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stopped = emit_sse_event("data: [DONE]", &tx);
        assert!(stopped);
        assert!(matches!(rx.try_recv(), Ok(ApiEvent::Done)));
    }

    #[test]
    fn sse_text_delta_is_parsed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunk = r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#;
        let stopped = emit_sse_event(chunk, &tx);
        assert!(!stopped);
        match rx.try_recv() {
            Ok(ApiEvent::TextDelta(text)) => assert_eq!(text, "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
