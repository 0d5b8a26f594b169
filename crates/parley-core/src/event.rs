//! Events fed into the chat client.

use parley_proto::InboundEvent;
use serde_json::Value;

use crate::{RequestId, ScopeId, SyncError};

/// Input to [`crate::ChatClient::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Event from the server, as routed.
    Inbound {
        /// Scope of the subscription that delivered the event. `None` for
        /// global subscriptions.
        scope: Option<ScopeId>,
        /// Decoded event.
        event: InboundEvent,
    },

    /// Acknowledgement payload for an `EmitWithAck`.
    AckReceived {
        /// Correlation id.
        request_id: RequestId,
        /// Raw acknowledgement payload.
        payload: Value,
    },

    /// An `EmitWithAck` failed before being acknowledged.
    AckFailed {
        /// Correlation id.
        request_id: RequestId,
        /// Failure.
        error: SyncError,
    },

    /// Periodic timer tick. Drives acknowledgement deadlines, retries and the
    /// typing debounce.
    Tick,
}
