use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::client::{CancelHandle, StreamCallbacks, StreamingResponseClient};
use crate::conversation::history::{ConversationStore, Message, MessageId};
use crate::conversation::starters::GREETING;
use crate::error::StreamError;
use crate::events::{StreamEvent, SuggestionSource};
use crate::offline;

/// Event for one placeholder, as applied by the manager
pub type Update = (MessageId, StreamEvent);

/// Forwards callbacks for one placeholder into its stream's queue
struct ChannelCallbacks {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelCallbacks {
    fn send(&self, event: StreamEvent) {
        // A send error means the manager dropped this stream.
        let _ = self.tx.send(event);
    }
}

impl StreamCallbacks for ChannelCallbacks {
    fn on_text_update(&mut self, fragment: &str) {
        self.send(StreamEvent::TextDelta(fragment.to_string()));
    }

    fn on_complete(&mut self, suggestions: Vec<String>, source: SuggestionSource) {
        self.send(StreamEvent::Suggestions {
            items: suggestions,
            source,
        });
    }

    fn on_error(&mut self, error: StreamError) {
        self.send(StreamEvent::Error(error));
    }

    fn on_text_end(&mut self) {
        self.send(StreamEvent::TextEnded);
    }

    fn on_finish(&mut self) {
        self.send(StreamEvent::Finished);
    }
}

/// The one stream the manager is listening to. Dropping it drops the queue,
/// so nothing from a replaced stream is ever applied.
struct ActiveStream {
    placeholder: MessageId,
    cancel: CancelHandle,
    updates: mpsc::UnboundedReceiver<StreamEvent>,
    /// Text is complete; only side-channel suggestions may still arrive
    answered: bool,
}

/// Owns the conversation and drives one streamed answer at a time.
///
/// Stream tasks never touch the store; they queue updates that the manager
/// applies on its own task.
pub struct ConversationManager {
    store: ConversationStore,
    client: StreamingResponseClient,
    awaiting_reply: bool,
    active: Option<ActiveStream>,
}

impl ConversationManager {
    /// Start a conversation that opens with the greeting
    pub fn new(client: StreamingResponseClient) -> Self {
        let mut store = ConversationStore::new();
        store.append(Message::bot(GREETING));

        Self {
            store,
            client,
            awaiting_reply: false,
            active: None,
        }
    }

    /// Append the question and a placeholder, then stream the answer into
    /// the placeholder in the background. Any answer still streaming is
    /// cancelled and settled with the text it has so far.
    ///
    /// Blank input is ignored. Must be called within a tokio runtime.
    pub fn submit(&mut self, text: &str) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }

        self.cancel_active();
        self.store.append(Message::user(text));
        let placeholder = self.store.append(Message::placeholder());
        self.awaiting_reply = true;

        let (tx, updates) = mpsc::unbounded_channel();
        let cancel = CancelHandle::new();
        let client = self.client.clone();
        let history = self.store.messages().to_vec();
        let mut callbacks = ChannelCallbacks { tx };
        let task_cancel = cancel.clone();

        tracing::info!(message_id = %placeholder, "Submitting question");
        tokio::spawn(async move {
            client
                .stream_response(&history, &mut callbacks, &task_cancel)
                .await;
        });

        self.active = Some(ActiveStream {
            placeholder,
            cancel,
            updates,
            answered: false,
        });
        Some(placeholder)
    }

    /// Answer from the canned offline replies instead of the backend
    pub fn submit_offline(&mut self, text: &str) -> Option<MessageId> {
        if text.trim().is_empty() {
            return None;
        }
        self.cancel_active();
        self.store.append(Message::user(text));
        Some(self.store.append(Message::bot(offline::canned_reply(text))))
    }

    /// Stop the outstanding stream, keeping whatever text already arrived
    pub fn cancel_active(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::info!(message_id = %active.placeholder, "Cancelling outstanding stream");
            active.cancel.cancel();
            self.store.settle(active.placeholder);
            self.awaiting_reply = false;
        }
    }

    /// Apply one update to the store
    pub fn apply(&mut self, message_id: MessageId, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta(fragment) => {
                self.store.append_to_text(message_id, fragment);
            }
            StreamEvent::Suggestions { items, source } => {
                if self.store.set_suggestions(message_id, items.clone(), *source) {
                    self.awaiting_reply = false;
                }
            }
            StreamEvent::TextEnded => {
                if self.store.settle(message_id) {
                    self.awaiting_reply = false;
                }
                if let Some(active) = self.active.as_mut() {
                    if active.placeholder == message_id {
                        active.answered = true;
                    }
                }
            }
            StreamEvent::Error(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "Answer failed");
                if self.store.fail(message_id, &self.client.config().apology_text) {
                    self.awaiting_reply = false;
                }
            }
            StreamEvent::Finished => {
                if self.store.settle(message_id) {
                    self.awaiting_reply = false;
                }
            }
        }

        if event.is_terminal() && self.is_active(message_id) {
            self.active = None;
        }
    }

    /// Apply every update queued so far without waiting
    pub fn process_stream_events(&mut self) -> usize {
        let Some(active) = self.active.as_mut() else {
            return 0;
        };
        let placeholder = active.placeholder;

        let mut queued = Vec::new();
        let mut closed = false;
        loop {
            match active.updates.try_recv() {
                Ok(event) => queued.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        let applied = queued.len();
        for event in &queued {
            self.apply(placeholder, event);
        }
        if closed {
            self.abandon(placeholder);
        }
        applied
    }

    /// Wait for the next update of the answer still streaming, apply it and
    /// hand it back. Returns `None` once the answer text is complete.
    pub async fn next_update(&mut self) -> Option<Update> {
        self.recv_update(false).await
    }

    /// Drive the outstanding answer until its text is complete
    pub async fn wait_for_reply(&mut self) {
        while self.recv_update(false).await.is_some() {}
    }

    /// Drive the outstanding stream until both requests have resolved, so
    /// late side-channel suggestions are applied too
    pub async fn wait_for_suggestions(&mut self) {
        while self.recv_update(true).await.is_some() {}
    }

    async fn recv_update(&mut self, past_answer: bool) -> Option<Update> {
        let active = self.active.as_mut()?;
        if active.answered && !past_answer {
            return None;
        }
        let placeholder = active.placeholder;

        let next = active.updates.recv().await;
        match next {
            Some(event) => {
                self.apply(placeholder, &event);
                Some((placeholder, event))
            }
            None => {
                self.abandon(placeholder);
                None
            }
        }
    }

    /// The stream task went away without a terminal event
    fn abandon(&mut self, placeholder: MessageId) {
        if !self.is_active(placeholder) {
            return;
        }
        tracing::warn!(message_id = %placeholder, "Stream task ended without finishing");
        self.active = None;
        self.store.fail(placeholder, &self.client.config().apology_text);
        self.awaiting_reply = false;
    }

    fn is_active(&self, message_id: MessageId) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.placeholder == message_id)
    }

    /// Whether the typing indicator should be shown
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Whether answer text is still arriving
    pub fn is_streaming(&self) -> bool {
        self.active.as_ref().is_some_and(|active| !active.answered)
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn client(&self) -> &StreamingResponseClient {
        &self.client
    }
}
