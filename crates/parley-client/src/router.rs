//! Event routing from the session into the client.
//!
//! The router binds one handler per event name for the lifetime of a scope.
//! Handlers decode and normalize the payload, tag it with the scope and queue
//! it as a [`ClientEvent`]. They never call into the state machine directly,
//! so a handler firing mid-dispatch cannot re-enter it.

use std::collections::HashMap;

use parley_core::{ClientEvent, ScopeId};
use parley_proto::{EventKind, InboundEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    session::{HandlerId, Session},
    transport::Transport,
};

/// Events bound for the whole process lifetime.
pub const GLOBAL_EVENTS: [EventKind; 6] = [
    EventKind::Connect,
    EventKind::Disconnect,
    EventKind::ConnectError,
    EventKind::ConversationUpdated,
    EventKind::AllMessagesRead,
    EventKind::MessageRead,
];

/// Events bound while a conversation view is open.
pub const VIEW_EVENTS: [EventKind; 3] =
    [EventKind::MessageReceived, EventKind::UserTyping, EventKind::UserStopTyping];

/// Scope a binding belongs to. `None` is the global scope.
type Scope = Option<ScopeId>;

/// Binds event handlers per scope and funnels decoded events into a queue.
#[derive(Debug)]
pub struct EventRouter {
    queue: mpsc::UnboundedSender<ClientEvent>,
    bindings: HashMap<Scope, Vec<(EventKind, HandlerId)>>,
}

impl EventRouter {
    /// Router feeding `queue`.
    pub fn new(queue: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { queue, bindings: HashMap::new() }
    }

    /// Bind `events` under `scope`, replacing whatever the scope had bound.
    ///
    /// Old handlers are removed before new ones are registered, so the two
    /// sets are never active together.
    pub fn bind<T: Transport>(&mut self, session: &mut Session<T>, scope: Scope, events: &[EventKind]) {
        self.unbind(session, scope);

        let handlers = events
            .iter()
            .map(|&kind| {
                let queue = self.queue.clone();
                let id = session.on(kind, Box::new(move |data| route(&queue, scope, kind, data)));
                (kind, id)
            })
            .collect();
        self.bindings.insert(scope, handlers);
        debug!(?scope, count = events.len(), "bound event handlers");
    }

    /// Remove every handler bound under `scope`. Returns how many were removed.
    pub fn unbind<T: Transport>(&mut self, session: &mut Session<T>, scope: Scope) -> usize {
        let Some(handlers) = self.bindings.remove(&scope) else {
            return 0;
        };
        let removed = handlers.iter().filter(|&&(kind, id)| session.off(kind, id)).count();
        debug!(?scope, removed, "unbound event handlers");
        removed
    }

    /// Number of handlers bound under `scope`.
    pub fn bound(&self, scope: Scope) -> usize {
        self.bindings.get(&scope).map_or(0, Vec::len)
    }
}

fn route(queue: &mpsc::UnboundedSender<ClientEvent>, scope: Scope, kind: EventKind, data: &Value) {
    match InboundEvent::decode(kind, data) {
        Ok(event) => {
            if queue.send(ClientEvent::Inbound { scope, event }).is_err() {
                debug!(event = kind.as_str(), "client queue closed, event dropped");
            }
        },
        Err(error) => warn!(event = kind.as_str(), %error, "dropping undecodable event"),
    }
}
