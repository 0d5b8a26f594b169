//! Optimistic message delivery.
//!
//! Every locally composed message is tracked here until the server stores it.
//! Each message carries up to two timers, both driven by `handle_tick`: the
//! acknowledgement deadline of the attempt in flight and the automatic retry
//! scheduled after a failure.
//!
//! # Invariants
//!
//! - At most one attempt per message awaits acknowledgement.
//! - At most one automatic retry is armed per message. A manual retry disarms
//!   it.
//! - Delivered messages are forgotten, so their identifiers never return to
//!   `sending` or `error`.
//! - An acknowledgement for a request that is no longer awaited is ignored.

use std::{fmt, ops::Sub, time::Duration};

use chrono::{DateTime, Utc};
use parley_proto::{
    ConversationId, UserId,
    payloads::{SendAck, SendMessage},
};
use tracing::{debug, warn};

use crate::{DeliveryStatus, Message, MessageId, SyncConfig, SyncError};

/// Identifies one acknowledgement wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Effect of a delivery state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAction {
    /// A new optimistic message exists.
    Appended {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// The message, in `sending` status.
        message: Message,
    },
    /// A tracked message changed. Its identifier may have changed too.
    Updated {
        /// Owning conversation.
        conversation_id: ConversationId,
        /// Identifier the transcript knows the message by.
        previous_id: MessageId,
        /// New state.
        message: Message,
    },
    /// Emit `send_message` and wait for acknowledgement.
    Dispatch {
        /// Correlates the eventual ack or failure.
        request_id: RequestId,
        /// Event payload.
        payload: SendMessage,
        /// Acknowledgement deadline.
        timeout: Duration,
    },
}

#[derive(Debug, Clone)]
struct Outbound<I> {
    conversation_id: ConversationId,
    message: Message,
    in_flight: Option<(RequestId, I)>,
    retry_armed_at: Option<I>,
}

/// Tracks undelivered messages and their timers.
#[derive(Debug, Clone)]
pub struct DeliveryCoordinator<I> {
    ack_timeout: Duration,
    retry_delay: Duration,
    outbound: Vec<Outbound<I>>,
    next_local_seq: u64,
    next_request: u64,
}

impl<I> DeliveryCoordinator<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a coordinator with the configured deadlines.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout,
            retry_delay: config.retry_delay,
            outbound: Vec::new(),
            next_local_seq: 1,
            next_request: 1,
        }
    }

    /// Start delivering a new message.
    ///
    /// Returns the optimistic append followed by the first dispatch.
    pub fn send(
        &mut self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        created_at: DateTime<Utc>,
        now: I,
    ) -> Vec<DeliveryAction> {
        let seq = self.next_local_seq;
        self.next_local_seq += 1;

        let message = Message::pending(seq, sender_id, content, created_at);
        debug!(%conversation_id, id = %message.id, "queued message");

        let mut actions =
            vec![DeliveryAction::Appended { conversation_id: conversation_id.clone(), message: message.clone() }];
        self.outbound.push(Outbound { conversation_id, message, in_flight: None, retry_armed_at: None });

        let index = self.outbound.len() - 1;
        actions.extend(self.dispatch(index, now));
        actions
    }

    /// Retry a message on request.
    ///
    /// Cancels any armed automatic retry. Ignored while an attempt is already
    /// awaiting acknowledgement or if the message is unknown.
    pub fn retry(&mut self, message_id: &MessageId, now: I) -> Vec<DeliveryAction> {
        let Some(index) = self.position_of_message(message_id) else {
            debug!(id = %message_id, "retry for untracked message ignored");
            return Vec::new();
        };
        self.reattempt(index, now)
    }

    /// Apply an acknowledgement for `request_id`.
    pub fn handle_ack(&mut self, request_id: RequestId, ack: &SendAck, now: I) -> Vec<DeliveryAction> {
        let Some(index) = self.position_of_request(request_id) else {
            debug!(%request_id, "late acknowledgement ignored");
            return Vec::new();
        };

        if !ack.is_delivered() {
            let reason = ack.error.clone().unwrap_or_else(|| ack.status.clone());
            return self.fail(index, &SyncError::Rejected(reason), now);
        }

        let entry = self.outbound.remove(index);
        let previous_id = entry.message.id.clone();
        let message = entry.message.apply_ack(ack);
        debug!(%previous_id, id = %message.id, "message delivered");

        vec![DeliveryAction::Updated { conversation_id: entry.conversation_id, previous_id, message }]
    }

    /// Apply a transport failure or timeout for `request_id`.
    pub fn handle_failure(
        &mut self,
        request_id: RequestId,
        error: &SyncError,
        now: I,
    ) -> Vec<DeliveryAction> {
        match self.position_of_request(request_id) {
            Some(index) => self.fail(index, error, now),
            None => {
                debug!(%request_id, %error, "failure for request no longer awaited");
                Vec::new()
            },
        }
    }

    /// Fire due timers.
    ///
    /// Expired acknowledgement deadlines fail their attempt. Due retries are
    /// re-dispatched when connected and disarmed otherwise; reconnection
    /// resumes them through [`Self::resume_errored`].
    pub fn handle_tick(&mut self, now: I, connected: bool) -> Vec<DeliveryAction> {
        let mut actions = Vec::new();

        let expired: Vec<RequestId> = self
            .outbound
            .iter()
            .filter_map(|entry| entry.in_flight)
            .filter(|&(_, sent_at)| now - sent_at >= self.ack_timeout)
            .map(|(request_id, _)| request_id)
            .collect();
        for request_id in expired {
            warn!(%request_id, "acknowledgement deadline passed");
            let error = SyncError::Timeout { elapsed: self.ack_timeout };
            actions.extend(self.handle_failure(request_id, &error, now));
        }

        let due: Vec<MessageId> = self
            .outbound
            .iter()
            .filter(|entry| entry.retry_armed_at.is_some_and(|armed| now - armed >= self.retry_delay))
            .map(|entry| entry.message.id.clone())
            .collect();
        for message_id in due {
            let Some(index) = self.position_of_message(&message_id) else {
                continue;
            };
            if connected {
                debug!(id = %message_id, "automatic retry");
                actions.extend(self.reattempt(index, now));
            } else if let Some(entry) = self.outbound.get_mut(index) {
                debug!(id = %message_id, "retry due while disconnected, waiting for reconnect");
                entry.retry_armed_at = None;
            }
        }

        actions
    }

    /// Re-dispatch every errored message that is not already in flight.
    ///
    /// Called once per reconnection.
    pub fn resume_errored(&mut self, now: I) -> Vec<DeliveryAction> {
        let errored: Vec<MessageId> = self
            .outbound
            .iter()
            .filter(|entry| entry.message.status == DeliveryStatus::Error && entry.in_flight.is_none())
            .map(|entry| entry.message.id.clone())
            .collect();

        let mut actions = Vec::new();
        for message_id in errored {
            if let Some(index) = self.position_of_message(&message_id) {
                actions.extend(self.reattempt(index, now));
            }
        }
        actions
    }

    /// Undelivered messages of one conversation, in send order.
    pub fn pending_for<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        self.outbound
            .iter()
            .filter(move |entry| &entry.conversation_id == conversation_id)
            .map(|entry| &entry.message)
    }

    /// Look up an undelivered message.
    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.outbound.iter().find(|entry| &entry.message.id == message_id).map(|entry| &entry.message)
    }

    /// Returns true if an attempt for the message awaits acknowledgement.
    pub fn is_awaiting_ack(&self, message_id: &MessageId) -> bool {
        self.entry(message_id).is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Returns true if an automatic retry is armed for the message.
    pub fn is_retry_armed(&self, message_id: &MessageId) -> bool {
        self.entry(message_id).is_some_and(|entry| entry.retry_armed_at.is_some())
    }

    /// Number of undelivered messages.
    pub fn len(&self) -> usize {
        self.outbound.len()
    }

    /// Returns true if everything has been delivered.
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }

    fn entry(&self, message_id: &MessageId) -> Option<&Outbound<I>> {
        self.outbound.iter().find(|entry| &entry.message.id == message_id)
    }

    fn position_of_message(&self, message_id: &MessageId) -> Option<usize> {
        self.outbound.iter().position(|entry| &entry.message.id == message_id)
    }

    fn position_of_request(&self, request_id: RequestId) -> Option<usize> {
        self.outbound
            .iter()
            .position(|entry| entry.in_flight.is_some_and(|(pending, _)| pending == request_id))
    }

    fn reattempt(&mut self, index: usize, now: I) -> Vec<DeliveryAction> {
        let Some(entry) = self.outbound.get_mut(index) else {
            return Vec::new();
        };
        if entry.in_flight.is_some() {
            debug!(id = %entry.message.id, "attempt already awaiting acknowledgement");
            return Vec::new();
        }

        let previous_id = entry.message.id.clone();
        entry.message = entry.message.clone().begin_attempt();
        let mut actions = vec![DeliveryAction::Updated {
            conversation_id: entry.conversation_id.clone(),
            previous_id,
            message: entry.message.clone(),
        }];
        actions.extend(self.dispatch(index, now));
        actions
    }

    fn dispatch(&mut self, index: usize, now: I) -> Option<DeliveryAction> {
        let request_id = RequestId(self.next_request);
        self.next_request += 1;

        let entry = self.outbound.get_mut(index)?;
        entry.retry_armed_at = None;
        entry.in_flight = Some((request_id, now));

        Some(DeliveryAction::Dispatch {
            request_id,
            payload: SendMessage {
                conversation_id: entry.conversation_id.clone(),
                content: entry.message.content.clone(),
                user_id: entry.message.sender_id.clone(),
            },
            timeout: self.ack_timeout,
        })
    }

    fn fail(&mut self, index: usize, error: &SyncError, now: I) -> Vec<DeliveryAction> {
        let Some(entry) = self.outbound.get_mut(index) else {
            return Vec::new();
        };

        entry.in_flight = None;
        let previous_id = entry.message.id.clone();
        entry.message = entry.message.clone().apply_failure(error);
        if error.is_retryable() && entry.retry_armed_at.is_none() {
            entry.retry_armed_at = Some(now);
        }
        debug!(id = %previous_id, %error, "send attempt failed");

        vec![DeliveryAction::Updated {
            conversation_id: entry.conversation_id.clone(),
            previous_id,
            message: entry.message.clone(),
        }]
    }
}
