//! Message model and delivery status transitions.
//!
//! A message starts life locally with a temporary identifier and status
//! [`DeliveryStatus::Sending`]. The transitions here are pure: they consume a
//! message and return the updated one, leaving scheduling to
//! [`crate::DeliveryCoordinator`].

use std::fmt;

use chrono::{DateTime, Utc};
use parley_proto::{
    UserId,
    payloads::{MessageReceived, SendAck},
};

use crate::SyncError;

/// Message identifier.
///
/// Local identifiers are assigned optimistically and replaced by the server's
/// durable identifier once the send is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    /// Durable identifier issued by the server.
    Server(String),
    /// Temporary identifier, unique within this client.
    Local(u64),
}

impl MessageId {
    /// Prefix of the textual form of local identifiers.
    pub const LOCAL_PREFIX: &'static str = "temp-";

    /// Returns true for an optimistic identifier.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Parse the textual form produced by `Display`.
    ///
    /// `temp-<n>` parses as a local identifier, anything else non-blank as a
    /// server identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(seq) = raw.strip_prefix(Self::LOCAL_PREFIX).and_then(|n| n.parse().ok()) {
            return Some(Self::Local(seq));
        }
        Some(Self::Server(raw.to_owned()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => f.write_str(id),
            Self::Local(seq) => write!(f, "{}{seq}", Self::LOCAL_PREFIX),
        }
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Awaiting acknowledgement.
    Sending,
    /// Stored by the server.
    Delivered,
    /// Last attempt failed. A retry may be scheduled.
    Error,
}

/// A chat message as displayed in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Current identifier.
    pub id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Text.
    pub content: String,
    /// Creation time. Local clock until the server's timestamp is known.
    pub created_at: DateTime<Utc>,
    /// Delivery status.
    pub status: DeliveryStatus,
    /// Description of the last failure while in [`DeliveryStatus::Error`].
    pub last_error: Option<String>,
}

impl Message {
    /// Optimistic message awaiting its first acknowledgement.
    pub fn pending(
        local_seq: u64,
        sender_id: UserId,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::Local(local_seq),
            sender_id,
            content: content.into(),
            created_at,
            status: DeliveryStatus::Sending,
            last_error: None,
        }
    }

    /// Message pushed by the server. `fallback` stamps it if the server did
    /// not.
    pub fn received(event: MessageReceived, fallback: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::Server(event.message_id),
            sender_id: event.user_id,
            content: event.content,
            created_at: event.delivered_at.unwrap_or(fallback),
            status: DeliveryStatus::Delivered,
            last_error: None,
        }
    }

    /// A new send attempt is starting.
    #[must_use]
    pub fn begin_attempt(self) -> Self {
        Self { status: DeliveryStatus::Sending, last_error: None, ..self }
    }

    /// Apply the server's acknowledgement.
    ///
    /// A delivered ack adopts the durable identifier and server timestamp.
    /// Any other status is a rejection.
    #[must_use]
    pub fn apply_ack(self, ack: &SendAck) -> Self {
        match (&ack.message_id, ack.is_delivered()) {
            (Some(durable), true) => Self {
                id: MessageId::Server(durable.clone()),
                created_at: ack.timestamp.unwrap_or(self.created_at),
                status: DeliveryStatus::Delivered,
                last_error: None,
                ..self
            },
            _ => {
                let reason = ack.error.clone().unwrap_or_else(|| ack.status.clone());
                self.apply_failure(&SyncError::Rejected(reason))
            },
        }
    }

    /// The current attempt failed.
    #[must_use]
    pub fn apply_failure(self, error: &SyncError) -> Self {
        Self { status: DeliveryStatus::Error, last_error: Some(error.to_string()), ..self }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("timestamp")
    }

    fn pending() -> Message {
        Message::pending(1, UserId::new("u1").expect("id"), "hi", at(1_000))
    }

    #[test]
    fn local_ids_round_trip_through_text() {
        let id = MessageId::Local(42);
        assert_eq!(id.to_string(), "temp-42");
        assert_eq!(MessageId::parse("temp-42"), Some(id));
        assert_eq!(MessageId::parse(" m9 "), Some(MessageId::Server("m9".into())));
        assert_eq!(MessageId::parse("temp-x"), Some(MessageId::Server("temp-x".into())));
        assert_eq!(MessageId::parse("  "), None);
    }

    #[test]
    fn delivered_ack_adopts_server_identity() {
        let message = pending().apply_ack(&SendAck::delivered("m1", Some(at(2_000))));

        assert_eq!(message.id, MessageId::Server("m1".into()));
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert_eq!(message.created_at, at(2_000));
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn delivered_ack_without_timestamp_keeps_local_time() {
        let message = pending().apply_ack(&SendAck::delivered("m1", None));
        assert_eq!(message.created_at, at(1_000));
    }

    #[test]
    fn non_delivered_ack_is_a_rejection() {
        let ack = SendAck {
            status: "error".into(),
            message_id: None,
            timestamp: None,
            error: Some("too long".into()),
        };
        let message = pending().apply_ack(&ack);

        assert!(message.id.is_local());
        assert_eq!(message.status, DeliveryStatus::Error);
        assert_eq!(message.last_error.as_deref(), Some("rejected by server: too long"));
    }

    #[test]
    fn retry_clears_previous_failure() {
        let failed = pending().apply_failure(&SyncError::Timeout { elapsed: Duration::from_secs(10) });
        assert_eq!(failed.status, DeliveryStatus::Error);

        let retried = failed.begin_attempt();
        assert_eq!(retried.status, DeliveryStatus::Sending);
        assert_eq!(retried.last_error, None);
        assert_eq!(retried.id, MessageId::Local(1));
    }
}
