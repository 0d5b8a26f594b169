//! Parley Core
//!
//! Sans-IO state machines that keep a local view of conversations in sync
//! with the server while tolerating disconnects, lost acknowledgements and
//! out-of-order delivery. Nothing here touches a socket or a clock directly:
//! time comes from an [`Environment`] and effects leave as [`ClientAction`]s,
//! so the same code runs under a real runtime and under deterministic tests.
//!
//! # Components
//!
//! - [`ChatClient`]: Conversation synchronizer and owner of all client state
//! - [`DeliveryCoordinator`]: Optimistic sends, acknowledgement deadlines and
//!   retries
//! - [`ConversationList`]: Summary list reconciliation (unread counts, last
//!   message)
//! - [`ConversationView`]: Transcript, typing presence and phase of the open
//!   conversation
//! - [`TypingDebounce`]: Keystroke bursts to start/stop notifications

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod client;
pub mod config;
mod connection;
mod conversations;
mod delivery;
pub mod env;
mod error;
mod event;
mod message;
mod typing;
mod view;

pub use action::{ClientAction, Update};
pub use client::ChatClient;
pub use config::SyncConfig;
pub use connection::ConnectionState;
pub use conversations::{ConversationKind, ConversationList, ConversationSummary};
pub use delivery::{DeliveryAction, DeliveryCoordinator, RequestId};
pub use env::{Environment, ManualEnv};
pub use error::SyncError;
pub use event::ClientEvent;
pub use message::{DeliveryStatus, Message, MessageId};
pub use typing::{TypingDebounce, TypingPresence};
pub use view::{ConversationSeed, ConversationView, Participant, ScopeId, ViewPhase};
