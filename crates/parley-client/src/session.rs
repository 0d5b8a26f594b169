//! Transport session.
//!
//! Owns the single duplex connection and speaks the frame protocol over it:
//! named events out, named events in, and acknowledgements correlated by id.
//! Inbound events are fanned out to handlers registered per event name.
//!
//! # Invariants
//!
//! - Acknowledgement ids are unique for the lifetime of the session.
//! - Every pending acknowledgement resolves exactly once: with the peer's
//!   payload, with `Timeout`, or with a transport error when the connection
//!   closes.
//! - Connection transitions are published on a `watch` channel before the
//!   corresponding `connect`/`disconnect` handlers run.

use std::{collections::HashMap, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use parley_core::{ConnectionState, SyncError};
use parley_proto::{EventKind, Frame, ProtocolError};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportError, TransportLink, TransportSignal};

/// Session errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No open connection.
    #[error("not connected")]
    NotConnected,

    /// Acknowledgement did not arrive in time.
    #[error("acknowledgement timed out after {elapsed:?}")]
    Timeout {
        /// Deadline that passed.
        elapsed: Duration,
    },

    /// Connection failed or closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<SessionError> for SyncError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Timeout { elapsed } => Self::Timeout { elapsed },
            SessionError::NotConnected => Self::Transport("not connected".into()),
            SessionError::Transport(reason) => Self::Transport(reason),
            SessionError::Protocol(error) => Self::Transport(error.to_string()),
        }
    }
}

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Callback for one event name. Receives the raw payload.
pub type Handler = Box<dyn FnMut(&Value) + Send>;

type AckSender = oneshot::Sender<Result<Value, SessionError>>;

/// Single duplex session with named-event dispatch.
pub struct Session<T: Transport> {
    transport: T,
    link: Option<TransportLink>,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
    pending_acks: HashMap<u64, AckSender>,
    next_handler: u64,
    next_ack: u64,
    state: watch::Sender<ConnectionState>,
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session over `transport`.
    pub fn new(transport: T) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            link: None,
            handlers: HashMap::new(),
            pending_acks: HashMap::new(),
            next_handler: 1,
            next_ack: 1,
            state,
        }
    }

    /// Open the link unless one is already open or opening.
    pub fn connect(&mut self) {
        if self.link.is_none() {
            info!("opening transport link");
            self.link = Some(self.transport.open());
        }
    }

    /// Close the link and fail every pending acknowledgement.
    ///
    /// Frames emitted before the call are still written by the transport.
    pub async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            info!("closing transport link");
            self.connection_lost("client disconnect");
            link.close().await;
        }
    }

    /// Observe connection state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Register a handler for `event`.
    pub fn on(&mut self, event: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.entry(event).or_default().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not registered for `event`.
    pub fn off(&mut self, event: EventKind, id: HandlerId) -> bool {
        let Some(handlers) = self.handlers.get_mut(&event) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(registered, _)| *registered != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.handlers.remove(&event);
        }
        removed
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: EventKind) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Emit a named event without waiting for acknowledgement.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotConnected` if the connection is not open
    /// - `SessionError::Transport` if the link rejects the frame
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), SessionError> {
        self.send(&Frame::event(event, payload))
    }

    /// Emit a named event and wait up to `timeout` for its acknowledgement.
    ///
    /// The returned future is independent of the session, so callers can
    /// hold it while the session keeps processing signals.
    pub fn emit_with_ack(
        &mut self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Value, SessionError>> {
        let id = self.next_ack;
        self.next_ack += 1;

        if let Err(error) = self.send(&Frame::event_with_ack(event, payload, id)) {
            return futures::future::ready(Err(error)).boxed();
        }

        // Waiters that gave up leave closed senders behind.
        self.pending_acks.retain(|_, waiter| !waiter.is_closed());

        let (tx, rx) = oneshot::channel();
        self.pending_acks.insert(id, tx);
        debug!(event, id, "awaiting acknowledgement");

        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(SessionError::Transport("session dropped".into())),
                Err(_) => Err(SessionError::Timeout { elapsed: timeout }),
            }
        }
        .boxed()
    }

    /// Wait for the next signal from the link.
    ///
    /// Pends forever while no link is open. A link whose task ended is
    /// reported as closed and released, so the next [`Self::connect`] opens a
    /// fresh one.
    pub async fn next_signal(&mut self) -> TransportSignal {
        let Some(link) = self.link.as_mut() else {
            return futures::future::pending().await;
        };
        let next = link.next_signal().await;
        match next {
            Some(signal) => signal,
            None => {
                self.link = None;
                TransportSignal::Closed { reason: "transport ended".into() }
            },
        }
    }

    /// Apply a signal: update connection state, resolve acknowledgements and
    /// dispatch events to handlers.
    pub fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Open => {
                if self.state.send_replace(ConnectionState::Connected).is_connected() {
                    debug!("duplicate open signal");
                    return;
                }
                info!("connected");
                self.dispatch(EventKind::Connect, &Value::Null);
            },
            TransportSignal::Closed { reason } => self.connection_lost(&reason),
            TransportSignal::OpenFailed { reason } => {
                warn!(%reason, "connection attempt failed");
                self.dispatch(EventKind::ConnectError, &Value::String(reason));
            },
            TransportSignal::Frame(text) => self.handle_frame(&text),
        }
    }

    fn handle_frame(&mut self, text: &str) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "dropping undecodable frame");
                return;
            },
        };

        match frame {
            Frame::Event { event, data, ack } => {
                if ack.is_some() {
                    debug!(%event, "peer requested an acknowledgement; none is sent");
                }
                match EventKind::from_name(&event) {
                    Some(kind) => self.dispatch(kind, &data),
                    None => debug!(%event, "ignoring unknown event"),
                }
            },
            Frame::Ack { id, data } => match self.pending_acks.remove(&id) {
                Some(waiter) => {
                    if waiter.send(Ok(data)).is_err() {
                        debug!(id, "acknowledgement arrived after its waiter gave up");
                    }
                },
                None => debug!(id, "acknowledgement for unknown request"),
            },
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        for (id, waiter) in self.pending_acks.drain() {
            debug!(id, "failing pending acknowledgement");
            let _ = waiter.send(Err(SessionError::Transport(format!("connection closed: {reason}"))));
        }
        if !self.state.send_replace(ConnectionState::Disconnected).is_connected() {
            return;
        }
        info!(%reason, "disconnected");
        self.dispatch(EventKind::Disconnect, &Value::String(reason.to_owned()));
    }

    fn dispatch(&mut self, event: EventKind, data: &Value) {
        let Some(handlers) = self.handlers.get_mut(&event) else {
            debug!(event = event.as_str(), "no handler registered");
            return;
        };
        for (_, handler) in handlers.iter_mut() {
            handler(data);
        }
    }

    fn send(&self, frame: &Frame) -> Result<(), SessionError> {
        if !self.connection_state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        link.send(frame.encode()?)?;
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.connection_state())
            .field("linked", &self.link.is_some())
            .field("pending_acks", &self.pending_acks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::transport::{MemoryPeer, MemoryTransport, memory_transport};

    async fn connected() -> (Session<MemoryTransport>, MemoryPeer) {
        let (transport, mut listener) = memory_transport();
        let mut session = Session::new(transport);
        session.connect();
        let peer = listener.accept().await.expect("peer");
        peer.open().await.expect("open");
        let signal = session.next_signal().await;
        session.handle_signal(signal);
        (session, peer)
    }

    fn recorder(session: &mut Session<MemoryTransport>, event: EventKind) -> (HandlerId, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = session.on(event, Box::new(move |data| sink.lock().expect("lock").push(data.clone())));
        (id, seen)
    }

    #[tokio::test]
    async fn emit_requires_connection() {
        let (transport, _listener) = memory_transport();
        let session = Session::new(transport);
        assert_eq!(session.emit("user_typing", json!({})), Err(SessionError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_delivers_frames_emitted_before_it() {
        let (mut session, mut peer) = connected().await;
        session.emit("leave_conversation", json!("42")).expect("emit");
        session.disconnect().await;

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(peer.next_frame().await, Some(Frame::event("leave_conversation", json!("42"))));
        assert_eq!(peer.next_frame().await, None);
    }

    #[tokio::test]
    async fn ack_resolves_matching_request() {
        let (mut session, mut peer) = connected().await;

        let pending = session.emit_with_ack("send_message", json!({ "content": "hi" }), Duration::from_secs(10));
        let Some(Frame::Event { ack: Some(id), .. }) = peer.next_frame().await else {
            panic!("expected an event requesting an ack");
        };
        peer.ack(id, json!({ "status": "delivered", "messageId": "m1" })).await.expect("ack");

        let signal = session.next_signal().await;
        session.handle_signal(signal);
        assert_eq!(pending.await, Ok(json!({ "status": "delivered", "messageId": "m1" })));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ack_times_out() {
        let (mut session, _peer) = connected().await;
        let pending = session.emit_with_ack("send_message", json!({}), Duration::from_secs(10));
        assert_eq!(pending.await, Err(SessionError::Timeout { elapsed: Duration::from_secs(10) }));
    }

    #[tokio::test]
    async fn close_fails_pending_acks_and_notifies_handlers() {
        let (mut session, peer) = connected().await;
        let (_, disconnects) = recorder(&mut session, EventKind::Disconnect);
        let mut state = session.subscribe_state();

        let pending = session.emit_with_ack("send_message", json!({}), Duration::from_secs(10));
        peer.drop_connection("server restart").await.expect("close");
        let signal = session.next_signal().await;
        session.handle_signal(signal);

        assert!(matches!(pending.await, Err(SessionError::Transport(_))));
        assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
        assert_eq!(disconnects.lock().expect("lock").as_slice(), [json!("server restart")]);
        assert_eq!(session.emit("user_typing", json!({})), Err(SessionError::NotConnected));
    }

    #[tokio::test]
    async fn handlers_fan_out_and_can_be_removed() {
        let (mut session, peer) = connected().await;
        let (first, first_seen) = recorder(&mut session, EventKind::UserTyping);
        let (_, second_seen) = recorder(&mut session, EventKind::UserTyping);

        peer.push("user_typing", json!({ "conversationId": "c1", "userId": "u2" })).await.expect("push");
        let signal = session.next_signal().await;
        session.handle_signal(signal);

        assert!(session.off(EventKind::UserTyping, first));
        assert!(!session.off(EventKind::UserTyping, first));

        peer.push("user_typing", json!({ "conversationId": "c1", "userId": "u3" })).await.expect("push");
        let signal = session.next_signal().await;
        session.handle_signal(signal);

        assert_eq!(first_seen.lock().expect("lock").len(), 1);
        assert_eq!(second_seen.lock().expect("lock").len(), 2);
        assert_eq!(session.handler_count(EventKind::UserTyping), 1);
    }

    #[tokio::test]
    async fn unknown_events_and_garbage_are_ignored() {
        let (mut session, peer) = connected().await;
        let (_, seen) = recorder(&mut session, EventKind::UserTyping);

        peer.push("server_gossip", json!({})).await.expect("push");
        let signal = session.next_signal().await;
        session.handle_signal(signal);
        session.handle_signal(TransportSignal::Frame("{not json".into()));

        assert!(seen.lock().expect("lock").is_empty());
        assert!(session.connection_state().is_connected());
    }
}
