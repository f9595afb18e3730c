use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::StreamError;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sender {
    /// Visitor typing into the chat box
    User,
    /// The assistant answering on the site owner's behalf
    Bot,
}

/// Which channel delivered a suggestion list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuggestionSource {
    /// The standalone suggestions endpoint
    SideChannel,
    /// A `suggestions` field inside the streamed text body
    Inline,
}

/// Events emitted while a response streams in
#[derive(Debug)]
pub enum StreamEvent {
    /// Text fragment to append to the placeholder
    TextDelta(String),
    /// Replacement suggestion list
    Suggestions {
        items: Vec<String>,
        source: SuggestionSource,
    },
    /// Text body read to its end; the side channel may still be pending
    TextEnded,
    /// Fatal failure; nothing follows
    Error(StreamError),
    /// Both channels resolved
    Finished,
}

impl StreamEvent {
    /// Whether no further events follow this one for the same request
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sender_round_trips_through_strings() {
        assert_eq!(Sender::User.to_string(), "user");
        assert_eq!(Sender::from_str("bot").unwrap(), Sender::Bot);
        assert_eq!(serde_json::to_string(&Sender::Bot).unwrap(), "\"bot\"");
    }

    #[test]
    fn only_error_and_finished_are_terminal() {
        assert!(StreamEvent::Finished.is_terminal());
        assert!(StreamEvent::Error(StreamError::NoUserMessage).is_terminal());
        assert!(!StreamEvent::TextDelta("x".into()).is_terminal());
        assert!(!StreamEvent::TextEnded.is_terminal());
        assert!(
            !StreamEvent::Suggestions {
                items: vec![],
                source: SuggestionSource::Inline,
            }
            .is_terminal()
        );
    }
}
