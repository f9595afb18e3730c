//! Streaming chat assistant for a personal portfolio site.
//!
//! [`StreamingResponseClient`] asks the backend about the latest user
//! message and reports the newline-delimited answer as it arrives;
//! [`ConversationManager`] owns the message log and applies those reports
//! to the bot placeholder.

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod offline;
pub mod streaming;

pub use client::{CancelHandle, QueryPayload, StreamCallbacks, StreamingResponseClient};
pub use config::Config;
pub use conversation::{ConversationManager, ConversationStore, Message, MessageId, MessageState};
pub use error::StreamError;
pub use events::{Sender, StreamEvent, SuggestionSource};
