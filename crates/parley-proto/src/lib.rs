//! Parley Protocol
//!
//! Wire contract between the chat client and the conversation server. Every
//! exchange is a named event carrying a JSON payload over a duplex channel;
//! some outbound events request an acknowledgement that travels back as its
//! own frame.
//!
//! # Components
//!
//! - [`Frame`]: JSON envelope for events and acknowledgements
//! - [`EventKind`]: The closed set of event names
//! - [`InboundEvent`] / [`OutboundEvent`]: Typed payloads per direction
//! - [`ConversationId`] / [`UserId`]: Identifiers normalized on ingestion
//!
//! # Normalization
//!
//! Event producers disagree on how they spell identifiers
//! (`conversationId`, `conversation_id`, `id`) and on whether they are
//! strings or numbers. Decoding an [`InboundEvent`] collapses all of them into
//! one canonical field so nothing downstream branches on payload shape.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod event;
mod frame;
mod ids;
pub mod payloads;
mod timestamp;

pub use errors::ProtocolError;
pub use event::{EventKind, InboundEvent, OutboundEvent};
pub use frame::Frame;
pub use ids::{ConversationId, UserId};
