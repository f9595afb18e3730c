use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::Config;
use crate::conversation::Message;
use crate::error::StreamError;
use crate::events::{Sender, StreamEvent, SuggestionSource};
use crate::streaming::{LineBuffer, decode_line, normalize_suggestions};

/// Receiver of everything a streamed answer produces.
///
/// Calls arrive one at a time, in the order the bytes were received.
pub trait StreamCallbacks {
    /// Append a fragment of answer text
    fn on_text_update(&mut self, fragment: &str);

    /// Replace the suggestion list. May fire once per source.
    fn on_complete(&mut self, suggestions: Vec<String>, source: SuggestionSource);

    /// Fatal failure; no further calls follow
    fn on_error(&mut self, error: StreamError);

    /// The answer text is complete. Side-channel suggestions may still
    /// follow.
    fn on_text_end(&mut self) {}

    /// Both requests resolved without a fatal error
    fn on_finish(&mut self) {}
}

/// Request body shared by both endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPayload {
    pub question: String,
    pub max_tokens: u32,
}

/// Signal telling an in-flight stream to stop touching its placeholder
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Longest error body kept from a rejected text request
const MAX_ERROR_BODY_CHARS: usize = 512;

/// What the merged request streams yield before reaching callbacks
enum Wire {
    /// Text endpoint answered with a success status
    Opened,
    Event(StreamEvent),
}

/// Client for the answer and suggestion endpoints
#[derive(Clone)]
pub struct StreamingResponseClient {
    config: Config,
    client: reqwest::Client,
}

impl StreamingResponseClient {
    pub fn new(config: Config) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the request body from the latest user message in `history`
    pub fn payload_for(&self, history: &[Message]) -> Result<QueryPayload, StreamError> {
        let query = history
            .iter()
            .rev()
            .find(|message| message.sender == Sender::User)
            .ok_or(StreamError::NoUserMessage)?;

        Ok(QueryPayload {
            question: query.text.clone(),
            max_tokens: self.config.max_tokens,
        })
    }

    /// Ask the backend about the latest user message in `history` and report
    /// the answer through `callbacks` as it streams in.
    ///
    /// The text and suggestion requests run concurrently. Suggestions that
    /// resolve before the text endpoint has answered are held back until it
    /// does, so a rejected answer never reports suggestions.
    pub async fn stream_response<C: StreamCallbacks>(
        &self,
        history: &[Message],
        callbacks: &mut C,
        cancel: &CancelHandle,
    ) {
        let payload = match self.payload_for(history) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Refusing to stream without a question");
                callbacks.on_error(e);
                return;
            }
        };

        tracing::info!(
            endpoint = %self.config.text_endpoint,
            question_len = payload.question.len(),
            "Streaming response"
        );

        let text = stream::once(self.open_text_stream(&payload)).flat_map(|opened| match opened {
            Ok(response) => stream::iter([Wire::Opened])
                .chain(decode_body(Box::pin(response.bytes_stream())).map(Wire::Event))
                .left_stream(),
            Err(e) => stream::iter([Wire::Event(StreamEvent::Error(e))]).right_stream(),
        });
        let side_channel = stream::once(self.fetch_suggestions(&payload)).map(|items| {
            Wire::Event(StreamEvent::Suggestions {
                items,
                source: SuggestionSource::SideChannel,
            })
        });
        let mut wire = pin!(stream::select(text, side_channel));

        let mut opened = false;
        let mut held: Option<StreamEvent> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Stream cancelled");
                    return;
                }
                next = wire.next() => next,
            };

            let event = match next {
                None => break,
                Some(Wire::Opened) => {
                    opened = true;
                    match held.take() {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Some(Wire::Event(event @ StreamEvent::Suggestions { .. })) if !opened => {
                    held = Some(event);
                    continue;
                }
                Some(Wire::Event(event)) => event,
            };

            if cancel.is_cancelled() {
                return;
            }
            if !dispatch(event, callbacks) {
                return;
            }
        }

        if !cancel.is_cancelled() {
            callbacks.on_finish();
        }
    }

    async fn open_text_stream(
        &self,
        payload: &QueryPayload,
    ) -> Result<reqwest::Response, StreamError> {
        let response = self
            .client
            .post(&self.config.text_endpoint)
            .json(payload)
            .send()
            .await
            .map_err(StreamError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response, self.config.request_timeout()).await;
            return Err(StreamError::Status { status, body });
        }

        Ok(response)
    }

    /// Side channel: never fails, an unusable answer is an empty list
    async fn fetch_suggestions(&self, payload: &QueryPayload) -> Vec<String> {
        match self.try_fetch_suggestions(payload).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Suggestions request failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch_suggestions(&self, payload: &QueryPayload) -> reqwest::Result<Vec<String>> {
        let body: Value = self
            .client
            .post(&self.config.suggestions_endpoint)
            .timeout(self.config.request_timeout())
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(match body.get("suggestions") {
            Some(Value::Array(items)) => normalize_suggestions(items),
            _ => Vec::new(),
        })
    }
}

/// Best-effort read of a rejected response's body, bounded in time and length
async fn error_body(response: reqwest::Response, limit: Duration) -> String {
    match tokio::time::timeout(limit, response.text()).await {
        Ok(Ok(body)) => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Could not read error body");
            String::new()
        }
        Err(_) => {
            tracing::debug!("Timed out reading error body");
            String::new()
        }
    }
}

/// Hand one event to the callbacks. Returns false once nothing may follow.
fn dispatch<C: StreamCallbacks>(event: StreamEvent, callbacks: &mut C) -> bool {
    match event {
        StreamEvent::TextDelta(fragment) => callbacks.on_text_update(&fragment),
        StreamEvent::TextEnded => callbacks.on_text_end(),
        StreamEvent::Suggestions { items, source } => {
            tracing::debug!(count = items.len(), source = %source, "Suggestions received");
            callbacks.on_complete(items, source);
        }
        StreamEvent::Error(e) => {
            tracing::error!(error = %e, "Streaming response failed");
            callbacks.on_error(e);
            return false;
        }
        StreamEvent::Finished => {
            callbacks.on_finish();
            return false;
        }
    }
    true
}

/// Turn a chunked body into events. Every complete line is decoded as an
/// envelope. At the end of the body an unterminated tail is forwarded as raw
/// text, followed by `TextEnded`. A read failure ends the stream with
/// `StreamError::Body` instead.
pub fn decode_body<S, B>(body: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    stream::unfold(Some((body, LineBuffer::new())), |state| async move {
        let (mut body, mut lines) = match state {
            Some(state) => state,
            None => return None,
        };
        match body.next().await {
            Some(Ok(chunk)) => {
                lines.push_chunk(chunk.as_ref());
                let events: Vec<StreamEvent> = lines
                    .drain_lines()
                    .iter()
                    .flat_map(|line| decode_line(line))
                    .collect();
                Some((events, Some((body, lines))))
            }
            Some(Err(e)) => Some((vec![StreamEvent::Error(StreamError::Body(e))], None)),
            None => {
                let mut tail: Vec<StreamEvent> =
                    lines.finish().map(StreamEvent::TextDelta).into_iter().collect();
                tail.push(StreamEvent::TextEnded);
                Some((tail, None))
            }
        }
    })
    .flat_map(stream::iter)
}
