//! Events travelling from an isolated task back to its executor.

use crate::protocol::ProtocolError;
use crate::records::Records;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One message on the event channel.
///
/// Exactly one terminal event ([`Event::Success`], [`Event::NoData`] or
/// [`Event::Failure`]) is expected per task; anything after it is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The remote service assigned an identifier to the running query.
    QueryIdCaptured { id: String },
    /// Transient status text; replaces the previous one.
    ProgressUpdate { text: String },
    /// Append-only log output.
    LogLine { text: String },
    /// The operation produced a non-empty result.
    Success { payload: Records },
    /// The operation finished cleanly without any rows.
    NoData,
    /// The operation raised an error or panicked.
    Failure { message: String },
}

impl Event {
    pub fn log(text: impl Into<String>) -> Self {
        Event::LogLine { text: text.into() }
    }

    pub fn progress(text: impl Into<String>) -> Self {
        Event::ProgressUpdate { text: text.into() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Event::Failure {
            message: message.into(),
        }
    }

    /// Whether this event ends the task.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Success { .. } | Event::NoData | Event::Failure { .. }
        )
    }

    /// Encode as a single protocol line (without the trailing newline).
    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a protocol line.
    ///
    /// Returns `None` for anything that is not a well-formed frame, so callers
    /// can treat the line as ordinary program output instead.
    pub fn from_frame(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::QueryIdCaptured { id } => write!(f, "query id {id}"),
            Event::ProgressUpdate { text } => write!(f, "progress: {text}"),
            Event::LogLine { text } => write!(f, "{text}"),
            Event::Success { payload } => write!(f, "success ({} rows)", payload.row_count()),
            Event::NoData => write!(f, "no data"),
            Event::Failure { message } => write!(f, "failure: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_uses_snake_case_tag() {
        let frame = Event::QueryIdCaptured {
            id: "20240101_000000_00001_abcde".into(),
        }
        .to_frame()
        .unwrap();
        assert_eq!(
            frame,
            r#"{"event":"query_id_captured","id":"20240101_000000_00001_abcde"}"#
        );
        assert_eq!(Event::NoData.to_frame().unwrap(), r#"{"event":"no_data"}"#);
    }

    #[test]
    fn ordinary_output_is_not_a_frame() {
        assert_eq!(Event::from_frame("Retrieved 10 rows"), None);
        assert_eq!(Event::from_frame(r#"{"unrelated": true}"#), None);
        // A writer killed mid-line leaves a truncated frame behind.
        assert_eq!(Event::from_frame(r#"{"event":"log_line","te"#), None);
    }

    #[test]
    fn frame_tolerates_surrounding_whitespace() {
        let event = Event::from_frame("  {\"event\":\"log_line\",\"text\":\"A\"}\r").unwrap();
        assert_eq!(event, Event::log("A"));
    }

    #[test]
    fn terminal_classification() {
        assert!(Event::NoData.is_terminal());
        assert!(Event::failure("boom").is_terminal());
        assert!(
            Event::Success {
                payload: Records::default()
            }
            .is_terminal()
        );
        assert!(!Event::log("x").is_terminal());
        assert!(!Event::progress("x").is_terminal());
        assert!(!Event::QueryIdCaptured { id: "q".into() }.is_terminal());
    }
}
