//! Event payload types.
//!
//! Outbound payloads serialize with the camelCase field names the server
//! expects. Inbound payloads are decoded through [`crate::InboundEvent`],
//! which resolves the conversation identifier before the remaining fields are
//! read, so the inbound structs here carry an already-normalized
//! [`ConversationId`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, UserId};

/// Acknowledgement status the server uses for a stored message.
pub const ACK_DELIVERED: &str = "delivered";

/// A user acting on a conversation.
///
/// Payload of `join_conversation`, `user_typing`, `user_stop_typing` and the
/// outbound `all_messages_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMember {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Acting user.
    pub user_id: UserId,
}

/// Payload of the acknowledged `send_message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Message text.
    pub content: String,
    /// Author.
    pub user_id: UserId,
}

/// Server acknowledgement of a `send_message` emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    /// Outcome reported by the server. Only [`ACK_DELIVERED`] means stored.
    pub status: String,

    /// Durable identifier assigned by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Server-side creation time.
    #[serde(
        default,
        deserialize_with = "crate::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    /// Failure description when the status is not delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendAck {
    /// Acknowledgement for a stored message.
    pub fn delivered(message_id: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            status: ACK_DELIVERED.to_owned(),
            message_id: Some(message_id.into()),
            timestamp,
            error: None,
        }
    }

    /// Whether the server stored the message under a durable identifier.
    pub fn is_delivered(&self) -> bool {
        self.status == ACK_DELIVERED && self.message_id.is_some()
    }

    /// Parse an acknowledgement payload.
    ///
    /// Message identifiers may be numeric; they are normalized to strings.
    pub fn from_value(value: &serde_json::Value) -> crate::errors::Result<Self> {
        let mut ack: Self = serde_json::from_value(strip_numeric_id(value)).map_err(|e| {
            crate::ProtocolError::InvalidPayload { event: "send_message", reason: e.to_string() }
        })?;
        ack.status = ack.status.trim().to_ascii_lowercase();
        Ok(ack)
    }
}

/// Replace a numeric `messageId` with its string form.
fn strip_numeric_id(value: &serde_json::Value) -> serde_json::Value {
    let mut value = value.clone();
    if let Some(object) = value.as_object_mut() {
        match object.get("messageId").map(crate::ids::normalize_value) {
            Some(Some(id)) => {
                object.insert("messageId".to_owned(), serde_json::Value::String(id));
            },
            Some(None) => {
                object.remove("messageId");
            },
            None => {},
        }
    }
    value
}

/// A message pushed by the server into a joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceived {
    /// Conversation, when the producer includes it. Room scoping already
    /// implies it.
    pub conversation_id: Option<ConversationId>,
    /// Durable server identifier.
    pub message_id: String,
    /// Author.
    pub user_id: UserId,
    /// Message text.
    pub content: String,
    /// Server-side delivery time.
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Read receipt for a whole conversation.
///
/// Payload of inbound `all_messages_read` and `message_read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    /// Conversation that was read.
    pub conversation_id: ConversationId,
    /// Reader, if the producer includes it.
    pub user_id: Option<UserId>,
}

/// Summary change for a conversation, independent of whether it is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationUpdated {
    /// Conversation that changed.
    pub conversation_id: ConversationId,
    /// Text of the newest message.
    pub last_message: Option<String>,
    /// Time of the newest message.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Author of the newest message.
    pub sender_id: Option<UserId>,
}
