//! Newline framing and envelope decoding for the streamed answer body

use serde_json::{Map, Value};
use std::collections::VecDeque;

use crate::events::{StreamEvent, SuggestionSource};

/// Carry-over buffer turning arbitrary byte chunks into complete lines
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    /// Bytes after the last newline seen so far
    pending: Vec<u8>,
    /// Lines split off but not yet taken
    queued_lines: VecDeque<String>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the body and queue every line it completes.
    ///
    /// Splitting happens on raw bytes, so a multi-byte character cut across
    /// two chunks is only decoded once its line is whole.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            self.queued_lines.push_back(line);
            start = end + 1;
        }
        self.pending.drain(..start);
    }

    /// Take the next complete line
    pub fn pop_line(&mut self) -> Option<String> {
        self.queued_lines.pop_front()
    }

    /// Take all complete lines queued so far
    pub fn drain_lines(&mut self) -> Vec<String> {
        self.queued_lines.drain(..).collect()
    }

    /// Partial line still waiting for its newline
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }

    /// End of stream: hand back the unterminated tail if it holds anything
    /// besides whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if tail.trim().is_empty() { None } else { Some(tail) }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode one complete line of the text body into stream events.
///
/// A line that is not JSON at all is passed through verbatim as text. Valid
/// JSON without a usable `content` or `suggestions` field yields nothing.
pub fn decode_line(line: &str) -> Vec<StreamEvent> {
    if line.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(envelope)) => decode_envelope(&envelope),
        Ok(other) => {
            tracing::debug!(kind = json_kind(&other), "Envelope is not an object, skipping");
            Vec::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable envelope, forwarding raw line");
            vec![StreamEvent::TextDelta(line.to_string())]
        }
    }
}

fn decode_envelope(envelope: &Map<String, Value>) -> Vec<StreamEvent> {
    let mut events = Vec::new();

    match envelope.get("content") {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) if text.is_empty() => {}
        Some(Value::String(text)) => events.push(StreamEvent::TextDelta(text.clone())),
        Some(other) => events.push(StreamEvent::TextDelta(other.to_string())),
    }

    if let Some(Value::Array(items)) = envelope.get("suggestions") {
        events.push(StreamEvent::Suggestions {
            items: normalize_suggestions(items),
            source: SuggestionSource::Inline,
        });
    }

    events
}

/// Normalize a whole suggestion list
pub fn normalize_suggestions(items: &[Value]) -> Vec<String> {
    items.iter().map(normalize_suggestion).collect()
}

/// Reduce one suggestion element to display text.
///
/// Precedence: a plain string, then an object's string `text` field, then
/// the object's first string-valued field in document order, then the
/// element's compact JSON form.
pub fn normalize_suggestion(item: &Value) -> String {
    match item {
        Value::String(text) => text.clone(),
        Value::Object(fields) => match fields.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => first_string_field(fields).unwrap_or_else(|| item.to_string()),
        },
        other => other.to_string(),
    }
}

fn first_string_field(fields: &Map<String, Value>) -> Option<String> {
    fields.values().find_map(Value::as_str).map(str::to_owned)
}
