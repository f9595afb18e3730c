use reqwest::StatusCode;

/// Fatal failures of a streamed answer.
///
/// Malformed envelope lines and side-channel failures are recovered where
/// they happen and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("no user message found in conversation history")]
    NoUserMessage,
    #[error("text request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("text request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response stream interrupted: {0}")]
    Body(#[source] reqwest::Error),
}

impl StreamError {
    /// Precondition failures are raised before any request is issued
    pub fn is_precondition(&self) -> bool {
        matches!(self, StreamError::NoUserMessage)
    }
}
