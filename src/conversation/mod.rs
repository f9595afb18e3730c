//! Conversation state and the discipline for mutating it from streams

pub mod commands;
pub mod history;
pub mod manager;
pub mod starters;

pub use commands::{ParsedCommand, SlashCommand, get_help_text, get_starters_text, parse_slash_command};
pub use history::{ConversationStore, Message, MessageId, MessageState};
pub use manager::ConversationManager;
pub use starters::{GREETING, STARTERS, StarterPrompt, find_starter};
