//! Named events and their typed payloads.
//!
//! [`EventKind`] is the closed vocabulary of event names. [`InboundEvent`] is
//! what the server pushes to us after normalization; [`OutboundEvent`] is what
//! the client emits.
//!
//! # Invariants
//!
//! Each event name maps to exactly one [`EventKind`] and back
//! (`EventKind::from_name(k.as_str()) == Some(k)`), enforced by match
//! exhaustiveness and tested over [`EventKind::ALL`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    ConversationId, UserId,
    errors::{ProtocolError, Result},
    ids::normalize_value,
    payloads::{ConversationMember, ConversationUpdated, MessageReceived, ReadReceipt, SendMessage},
};

/// Every event name in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection established (transport lifecycle).
    Connect,
    /// Connection lost (transport lifecycle).
    Disconnect,
    /// Connection attempt failed (transport lifecycle).
    ConnectError,
    /// Subscribe to a conversation room.
    JoinConversation,
    /// Unsubscribe from a conversation room.
    LeaveConversation,
    /// Typing started.
    UserTyping,
    /// Typing stopped.
    UserStopTyping,
    /// Durable send, acknowledged.
    SendMessage,
    /// Remote message arrival.
    MessageReceived,
    /// Read receipt for a conversation.
    AllMessagesRead,
    /// Alias of [`EventKind::AllMessagesRead`].
    MessageRead,
    /// Conversation summary changed.
    ConversationUpdated,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 12] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::ConnectError,
        EventKind::JoinConversation,
        EventKind::LeaveConversation,
        EventKind::UserTyping,
        EventKind::UserStopTyping,
        EventKind::SendMessage,
        EventKind::MessageReceived,
        EventKind::AllMessagesRead,
        EventKind::MessageRead,
        EventKind::ConversationUpdated,
    ];

    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::JoinConversation => "join_conversation",
            Self::LeaveConversation => "leave_conversation",
            Self::UserTyping => "user_typing",
            Self::UserStopTyping => "user_stop_typing",
            Self::SendMessage => "send_message",
            Self::MessageReceived => "message_received",
            Self::AllMessagesRead => "all_messages_read",
            Self::MessageRead => "message_read",
            Self::ConversationUpdated => "conversation_updated",
        }
    }

    /// Look up an event by wire name. `None` if unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether the server (or the transport) ever delivers this event to us.
    pub fn is_inbound(self) -> bool {
        !matches!(self, Self::JoinConversation | Self::LeaveConversation | Self::SendMessage)
    }
}

/// Event received from the server, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Transport connected (or reconnected).
    Connected,
    /// Transport disconnected.
    Disconnected {
        /// Transport-provided reason. May be empty.
        reason: String,
    },
    /// Transport failed to connect.
    ConnectError {
        /// Transport-provided reason. May be empty.
        reason: String,
    },
    /// A message arrived in the joined room.
    MessageReceived(MessageReceived),
    /// A user started typing.
    UserTyping(ConversationMember),
    /// A user stopped typing.
    UserStopTyping(ConversationMember),
    /// Conversation marked read.
    AllMessagesRead(ReadReceipt),
    /// Conversation marked read (alias producer).
    MessageRead(ReadReceipt),
    /// Conversation summary changed.
    ConversationUpdated(ConversationUpdated),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMember {
    #[serde(alias = "user_id")]
    user_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default, alias = "message_id")]
    message_id: Option<Value>,
    #[serde(alias = "user_id")]
    user_id: UserId,
    #[serde(alias = "content")]
    message: String,
    #[serde(default, alias = "delivered_at", deserialize_with = "crate::timestamp::option")]
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default, alias = "user_id")]
    user_id: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUpdate {
    #[serde(default, alias = "last_message")]
    last_message: Option<String>,
    #[serde(default, alias = "last_message_at", deserialize_with = "crate::timestamp::option")]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "sender_id")]
    sender_id: Option<Value>,
}

impl InboundEvent {
    /// Decode a payload delivered under `name`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` if `name` is not a protocol event
    /// - Any error from [`InboundEvent::decode`]
    pub fn decode_named(name: &str, data: &Value) -> Result<Self> {
        let kind = EventKind::from_name(name)
            .ok_or_else(|| ProtocolError::UnknownEvent(name.to_owned()))?;
        Self::decode(kind, data)
    }

    /// Decode and normalize a payload for a known event kind.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::NotInbound` for client-only events
    /// - `ProtocolError::MissingConversationId` if a conversation-scoped
    ///   payload carries no usable identifier
    /// - `ProtocolError::InvalidPayload` if the remaining fields are malformed
    pub fn decode(kind: EventKind, data: &Value) -> Result<Self> {
        match kind {
            EventKind::Connect => Ok(Self::Connected),
            EventKind::Disconnect => Ok(Self::Disconnected { reason: reason_text(data) }),
            EventKind::ConnectError => Ok(Self::ConnectError { reason: reason_text(data) }),
            EventKind::MessageReceived => decode_message(data).map(Self::MessageReceived),
            EventKind::UserTyping => decode_member(kind, data).map(Self::UserTyping),
            EventKind::UserStopTyping => decode_member(kind, data).map(Self::UserStopTyping),
            EventKind::AllMessagesRead => decode_receipt(kind, data).map(Self::AllMessagesRead),
            EventKind::MessageRead => decode_receipt(kind, data).map(Self::MessageRead),
            EventKind::ConversationUpdated => {
                decode_update(data).map(Self::ConversationUpdated)
            },
            EventKind::JoinConversation
            | EventKind::LeaveConversation
            | EventKind::SendMessage => Err(ProtocolError::NotInbound(kind.as_str())),
        }
    }

    /// Event kind this event was decoded from.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connect,
            Self::Disconnected { .. } => EventKind::Disconnect,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::MessageReceived(_) => EventKind::MessageReceived,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::UserStopTyping(_) => EventKind::UserStopTyping,
            Self::AllMessagesRead(_) => EventKind::AllMessagesRead,
            Self::MessageRead(_) => EventKind::MessageRead,
            Self::ConversationUpdated(_) => EventKind::ConversationUpdated,
        }
    }
}

fn parse<T: DeserializeOwned>(kind: EventKind, data: &Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| ProtocolError::InvalidPayload { event: kind.as_str(), reason: e.to_string() })
}

fn conversation_id(kind: EventKind, data: &Value) -> Result<ConversationId> {
    ConversationId::from_payload(data)
        .ok_or(ProtocolError::MissingConversationId { event: kind.as_str() })
}

fn decode_member(kind: EventKind, data: &Value) -> Result<ConversationMember> {
    let conversation_id = conversation_id(kind, data)?;
    let raw: RawMember = parse(kind, data)?;
    Ok(ConversationMember { conversation_id, user_id: raw.user_id })
}

fn decode_message(data: &Value) -> Result<MessageReceived> {
    let kind = EventKind::MessageReceived;
    let raw: RawMessage = parse(kind, data)?;
    let message_id = raw.message_id.as_ref().and_then(normalize_value).ok_or_else(|| {
        ProtocolError::InvalidPayload { event: kind.as_str(), reason: "missing messageId".into() }
    })?;

    Ok(MessageReceived {
        // A bare `id` here may be the message's own.
        conversation_id: ConversationId::from_explicit_fields(data),
        message_id,
        user_id: raw.user_id,
        content: raw.message,
        delivered_at: raw.delivered_at,
    })
}

fn decode_receipt(kind: EventKind, data: &Value) -> Result<ReadReceipt> {
    let conversation_id = conversation_id(kind, data)?;
    // Bare-identifier payloads carry no other fields.
    let user_id = if data.is_object() {
        let raw: RawReceipt = parse(kind, data)?;
        raw.user_id.as_ref().and_then(UserId::from_value)
    } else {
        None
    };
    Ok(ReadReceipt { conversation_id, user_id })
}

fn decode_update(data: &Value) -> Result<ConversationUpdated> {
    let kind = EventKind::ConversationUpdated;
    let conversation_id = conversation_id(kind, data)?;
    let raw: RawUpdate = parse(kind, data)?;
    Ok(ConversationUpdated {
        conversation_id,
        last_message: raw.last_message,
        last_message_at: raw.last_message_at,
        sender_id: raw.sender_id.as_ref().and_then(UserId::from_value),
    })
}

fn reason_text(data: &Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            map.get("message").and_then(Value::as_str).map_or_else(|| data.to_string(), Into::into)
        },
        other => other.to_string(),
    }
}

/// Event the client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Subscribe to a conversation room.
    JoinConversation(ConversationMember),
    /// Unsubscribe from a conversation room. Payload is the bare identifier.
    LeaveConversation(ConversationId),
    /// Local user started typing.
    UserTyping(ConversationMember),
    /// Local user stopped typing.
    UserStopTyping(ConversationMember),
    /// Durable send. Emitted with an acknowledgement request.
    SendMessage(SendMessage),
    /// Local user read the conversation.
    AllMessagesRead(ConversationMember),
}

impl OutboundEvent {
    /// Event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::JoinConversation(_) => EventKind::JoinConversation,
            Self::LeaveConversation(_) => EventKind::LeaveConversation,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::UserStopTyping(_) => EventKind::UserStopTyping,
            Self::SendMessage(_) => EventKind::SendMessage,
            Self::AllMessagesRead(_) => EventKind::AllMessagesRead,
        }
    }

    /// Wire name.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Conversation the event targets.
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::JoinConversation(m)
            | Self::UserTyping(m)
            | Self::UserStopTyping(m)
            | Self::AllMessagesRead(m) => &m.conversation_id,
            Self::LeaveConversation(id) => id,
            Self::SendMessage(m) => &m.conversation_id,
        }
    }

    /// JSON payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn payload(&self) -> Result<Value> {
        let encoded = match self {
            Self::JoinConversation(m)
            | Self::UserTyping(m)
            | Self::UserStopTyping(m)
            | Self::AllMessagesRead(m) => serde_json::to_value(m),
            Self::LeaveConversation(id) => serde_json::to_value(id),
            Self::SendMessage(m) => serde_json::to_value(m),
        };
        encoded.map_err(|e| ProtocolError::Encode { event: self.name(), reason: e.to_string() })
    }
}
