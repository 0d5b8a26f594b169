//! Protocol error types.
//!
//! Decoding never panics on hostile or sloppy input. Every way a frame or
//! payload can be wrong maps to a [`ProtocolError`] variant that callers log
//! and drop.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text is not a valid JSON envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Event name is not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Event exists but is never sent by the server.
    #[error("event {0} is not an inbound event")]
    NotInbound(&'static str),

    /// Payload has no usable conversation identifier under any known field
    /// name.
    #[error("missing conversation identifier in {event} payload")]
    MissingConversationId {
        /// Event whose payload was inspected.
        event: &'static str,
    },

    /// Payload fields do not match the expected shape.
    #[error("invalid {event} payload: {reason}")]
    InvalidPayload {
        /// Event whose payload was rejected.
        event: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },

    /// Payload could not be serialized.
    #[error("failed to encode {event} payload: {reason}")]
    Encode {
        /// Event being encoded.
        event: &'static str,
        /// Encoder diagnostic.
        reason: String,
    },
}
