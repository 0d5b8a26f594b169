//! Parley Client
//!
//! Async shell around [`parley_core`]. The core decides what should happen;
//! this crate makes it happen over a real connection.
//!
//! # Components
//!
//! - [`Runtime`]: Event loop executing client actions and feeding events back
//! - [`Session`]: Named events, acknowledgements and connection state over a
//!   single transport link
//! - [`EventRouter`]: Per-scope handler bindings that queue decoded events
//! - [`Transport`]: Duplex text channel, with an in-memory implementation for
//!   tests
//! - [`HistorySource`]: Initial transcript and summary list loading
//!
//! # WebSocket (optional)
//!
//! With the `websocket` feature enabled, [`websocket::WebSocketTransport`]
//! connects to a real server and reconnects with backoff.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod history;
pub mod router;
pub mod runtime;
pub mod session;
pub mod system_env;
pub mod transport;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use history::{HistoryError, HistorySource, NoHistory, StaticHistory};
pub use router::{EventRouter, GLOBAL_EVENTS, VIEW_EVENTS};
pub use runtime::{Command, Runtime, RuntimeConfig, RuntimeError, RuntimeHandle};
pub use session::{Handler, HandlerId, Session, SessionError};
pub use system_env::SystemEnv;
pub use transport::{
    MemoryListener, MemoryPeer, MemoryTransport, Transport, TransportError, TransportLink,
    TransportSignal, memory_transport,
};
