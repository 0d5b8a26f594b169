//! JSON frame envelope.
//!
//! A frame is one text message on the duplex channel. Two shapes exist:
//!
//! ```text
//! {"type":"event","event":"send_message","data":{...},"ack":7}
//! {"type":"ack","id":7,"data":{...}}
//! ```
//!
//! An event frame with an `ack` id asks the peer to answer with an ack frame
//! carrying the same id. Ids are scoped to one connection and never reused
//! within it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// One message on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Named event.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
        /// Acknowledgement id requested by the sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    /// Answer to an event frame that requested acknowledgement.
    Ack {
        /// Id copied from the event frame.
        id: u64,
        /// Acknowledgement payload.
        #[serde(default)]
        data: Value,
    },
}

impl Frame {
    /// Fire-and-forget event frame.
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self::Event { event: event.into(), data, ack: None }
    }

    /// Event frame requesting acknowledgement `id`.
    pub fn event_with_ack(event: impl Into<String>, data: Value, id: u64) -> Self {
        Self::Event { event: event.into(), data, ack: Some(id) }
    }

    /// Acknowledgement frame for request `id`.
    pub fn ack(id: u64, data: Value) -> Self {
        Self::Ack { id, data }
    }

    /// Encode as JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProtocolError::Encode { event: "frame", reason: e.to_string() })
    }

    /// Decode JSON text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedFrame` if the text is not a frame envelope
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_without_ack_omits_field() {
        let frame = Frame::event("user_typing", json!({ "conversationId": "c" }));
        let text = frame.encode();
        assert_eq!(
            text.as_deref(),
            Ok(r#"{"type":"event","event":"user_typing","data":{"conversationId":"c"}}"#)
        );
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let frame = Frame::decode(r#"{"type":"event","event":"connect"}"#);
        assert_eq!(frame, Ok(Frame::Event { event: "connect".into(), data: Value::Null, ack: None }));
    }

    #[test]
    fn rejects_unknown_envelope() {
        assert!(matches!(
            Frame::decode(r#"{"type":"ping"}"#),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(matches!(Frame::decode("not json"), Err(ProtocolError::MalformedFrame(_))));
    }
}
