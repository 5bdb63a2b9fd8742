//! Payloads written to the client event stream.
//!
//! Each frame is a single JSON object, either
//! `{"content", "timestamp", "finished"}` or `{"error", "timestamp", "finished"}`.

use chrono::Utc;
use serde::Serialize;

use crate::failure::RelayFailure;
use crate::types::Timestamp;

/// Human-readable timestamp format used in every frame.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One frame on a relay connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Content {
        content: String,
        timestamp: String,
        finished: bool,
    },
    Error {
        error: String,
        timestamp: String,
        finished: bool,
    },
}

impl StreamEvent {
    /// First frame on a connection: empty content, not finished.
    pub fn accepted() -> Self {
        Self::content("", false)
    }

    pub fn content(content: impl Into<String>, finished: bool) -> Self {
        Self::content_at(content, finished, Utc::now())
    }

    pub fn content_at(content: impl Into<String>, finished: bool, at: Timestamp) -> Self {
        StreamEvent::Content {
            content: content.into(),
            timestamp: format_timestamp(at),
            finished,
        }
    }

    /// Terminal error frame carrying the failure's safe message.
    pub fn failure(failure: &RelayFailure) -> Self {
        StreamEvent::Error {
            error: failure.to_string(),
            timestamp: format_timestamp(Utc::now()),
            finished: true,
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            StreamEvent::Content { finished, .. } | StreamEvent::Error { finished, .. } => {
                *finished
            }
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings and bools cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn format_timestamp(at: Timestamp) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn content_frame_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&StreamEvent::content_at("hello", false, at).to_json()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "content": "hello",
                "timestamp": "2024-05-01 12:30:05",
                "finished": false,
            })
        );
    }

    #[test]
    fn error_frame_is_finished_and_has_no_content() {
        let event = StreamEvent::failure(&RelayFailure::StreamTimeout);
        assert!(event.is_finished());

        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["finished"], true);
        assert_eq!(json["error"], RelayFailure::StreamTimeout.to_string());
    }

    #[test]
    fn accepted_frame_is_empty_and_open() {
        let event = StreamEvent::accepted();
        assert!(!event.is_finished());
        assert!(matches!(event, StreamEvent::Content { ref content, .. } if content.is_empty()));
    }
}
