//! Notification events delivered through the hub.
//!
//! Every push frame is wrapped under the same envelope type (`"message"`).
//! Producers put the business event kind inside the payload as `data.type`,
//! which is why [`NotificationEvent::payload_type`] exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope type stamped on every event coming off the push channel.
pub const MESSAGE_EVENT_TYPE: &str = "message";

/// A decoded push frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Envelope type. Always [`MESSAGE_EVENT_TYPE`] for transport events.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Parsed JSON body, or the raw body as a JSON string when it did not parse.
    pub data: Value,
}

impl NotificationEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self { event_type: event_type.into(), data }
    }

    /// Wrap a payload in the transport envelope.
    #[must_use]
    pub fn message(data: Value) -> Self {
        Self::new(MESSAGE_EVENT_TYPE, data)
    }

    /// Decode a frame body. Malformed JSON is not an error: the raw text is
    /// delivered instead.
    #[must_use]
    pub fn from_frame_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(data) => Self::message(data),
            Err(e) => {
                tracing::debug!(error = %e, body_len = body.len(), "sse: frame body is not JSON, delivering raw text");
                Self::message(Value::String(body.to_owned()))
            }
        }
    }

    /// Business event kind carried in `data.type`, if present and non-empty.
    #[must_use]
    pub fn payload_type(&self) -> Option<&str> {
        self.data
            .get("type")
            .and_then(Value::as_str)
            .filter(|kind| !kind.is_empty())
    }

    /// Secondary routing key: the payload type when it differs from the envelope.
    #[must_use]
    pub fn secondary_topic(&self) -> Option<&str> {
        self.payload_type().filter(|kind| *kind != self.event_type)
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
