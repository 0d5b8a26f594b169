//! Actions produced by the chat client.
//!
//! The client never performs I/O. It returns these actions and the runtime
//! executes them: emitting events on the session, (un)binding view
//! subscriptions on the router and publishing state to the UI.

use std::time::Duration;

use parley_proto::{ConversationId, OutboundEvent, UserId};

use crate::{ConnectionState, ConversationSummary, Message, RequestId, ScopeId};

/// Action for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Fire-and-forget emission.
    Emit(OutboundEvent),

    /// Emission awaiting acknowledgement. The runtime must answer with
    /// `ClientEvent::AckReceived` or `ClientEvent::AckFailed` for `request_id`.
    EmitWithAck {
        /// Correlation id.
        request_id: RequestId,
        /// Event to emit.
        event: OutboundEvent,
        /// Acknowledgement deadline.
        timeout: Duration,
    },

    /// Subscribe the view event set under `scope`.
    BindView {
        /// New scope.
        scope: ScopeId,
        /// Conversation the scope belongs to.
        conversation_id: ConversationId,
    },

    /// Drop every subscription registered under `scope`.
    UnbindView {
        /// Scope to release.
        scope: ScopeId,
    },

    /// State change for observers.
    Publish(Update),
}

/// State published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Transcript of the open conversation changed.
    Transcript {
        /// Open conversation.
        conversation_id: ConversationId,
        /// Full transcript.
        messages: Vec<Message>,
    },

    /// Set of remote users typing in the open conversation changed.
    Typing {
        /// Open conversation.
        conversation_id: ConversationId,
        /// Users typing.
        users: Vec<UserId>,
    },

    /// Conversation list changed.
    Conversations(Vec<ConversationSummary>),

    /// Connection state changed.
    Connection(ConnectionState),

    /// A message was submitted; the composer may be cleared.
    ComposerCleared {
        /// Conversation the message went to.
        conversation_id: ConversationId,
    },
}
