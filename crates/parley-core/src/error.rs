//! Error taxonomy for synchronization.
//!
//! None of these are fatal. Send failures turn into a message in `error`
//! status, with a retry scheduled unless the server rejected it;
//! reconciliation misses are logged and otherwise ignored.

use std::time::Duration;

use parley_proto::ConversationId;
use thiserror::Error;

/// Errors surfaced by the synchronization state machines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Acknowledgement not received within the deadline.
    #[error("acknowledgement timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// Connection-level failure surfaced by the channel.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered but did not store the message.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// An event referenced a conversation missing from the summary list.
    #[error("conversation {conversation_id} is not in the summary list")]
    ReconciliationMiss {
        /// Identifier that failed to match.
        conversation_id: ConversationId,
    },
}

impl SyncError {
    /// Returns true if the failed send should be retried automatically.
    ///
    /// A rejection is the server's answer, so resending the same content
    /// without user intent would be rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_sends_are_retryable() {
        assert!(SyncError::Timeout { elapsed: Duration::from_secs(10) }.is_retryable());
        assert!(SyncError::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn rejections_wait_for_the_user() {
        assert!(!SyncError::Rejected("too long".into()).is_retryable());
    }

    #[test]
    fn reconciliation_miss_is_not_a_send_failure() {
        let miss = SyncError::ReconciliationMiss {
            conversation_id: ConversationId::new("c1").expect("id"),
        };
        assert!(!miss.is_retryable());
        assert_eq!(miss.to_string(), "conversation c1 is not in the summary list");
    }
}
