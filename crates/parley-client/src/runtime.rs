//! Async runtime.
//!
//! Event loop that executes the [`ChatClient`]'s actions against the
//! [`Session`] and feeds everything that happens back in as
//! [`ClientEvent`]s. All state mutations happen on this one loop; the
//! session's handlers and the acknowledgement futures only enqueue.
//!
//! Inputs, multiplexed with `tokio::select!`:
//! - transport signals (frames, open, close)
//! - events queued by the [`EventRouter`]
//! - completed acknowledgement waits
//! - commands from a [`RuntimeHandle`]
//! - a periodic tick for timers

use std::time::Duration;

use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use parley_core::{
    ChatClient, ClientAction, ClientEvent, ConnectionState, Environment, MessageId, SyncConfig,
    SyncError, Update,
};
use parley_proto::{ConversationId, OutboundEvent, UserId};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    history::HistorySource,
    router::{EventRouter, GLOBAL_EVENTS, VIEW_EVENTS},
    session::{Session, SessionError},
    transport::{Transport, TransportSignal},
};

/// Default timer resolution.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default capacity of the update broadcast channel.
pub const DEFAULT_UPDATE_CAPACITY: usize = 256;

const COMMAND_CAPACITY: usize = 64;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime loop has stopped.
    #[error("runtime stopped")]
    Stopped,

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runtime tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Interval between timer ticks.
    pub tick_interval: Duration,
    /// Updates buffered per subscriber before it lags.
    pub update_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_interval: DEFAULT_TICK_INTERVAL, update_capacity: DEFAULT_UPDATE_CAPACITY }
    }
}

/// User intent sent to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a conversation, closing the current one.
    Open(ConversationId),
    /// Close the open conversation.
    Close,
    /// Composer keystroke.
    Keystroke,
    /// Send a message to the open conversation.
    Send(String),
    /// Retry an errored message.
    Retry(MessageId),
    /// Stop the runtime.
    Shutdown,
}

/// Cloneable handle for driving a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<Update>,
    connection: watch::Receiver<ConnectionState>,
}

impl RuntimeHandle {
    /// Queue a command.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Stopped` if the runtime has exited
    pub async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).await.map_err(|_| RuntimeError::Stopped)
    }

    /// Subscribe to state updates published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }

    /// Observe connection state.
    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }
}

enum Step {
    Signal(TransportSignal),
    Event(ClientEvent),
    Command(Command),
    Shutdown,
}

/// Event loop owning the client state machine and the session.
pub struct Runtime<T, H, E>
where
    T: Transport,
    H: HistorySource,
    E: Environment,
{
    client: ChatClient<E>,
    session: Session<T>,
    router: EventRouter,
    routed: mpsc::UnboundedReceiver<ClientEvent>,
    acks: FuturesUnordered<BoxFuture<'static, ClientEvent>>,
    commands: mpsc::Receiver<Command>,
    updates: broadcast::Sender<Update>,
    history: H,
    config: RuntimeConfig,
}

impl<T, H, E> Runtime<T, H, E>
where
    T: Transport,
    H: HistorySource,
    E: Environment,
{
    /// Create a runtime and the handle that drives it.
    pub fn new(
        transport: T,
        history: H,
        env: E,
        user_id: UserId,
        sync: SyncConfig,
        config: RuntimeConfig,
    ) -> (Self, RuntimeHandle) {
        let session = Session::new(transport);
        let (queue, routed) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));

        let handle = RuntimeHandle {
            commands: commands_tx,
            updates: updates.clone(),
            connection: session.subscribe_state(),
        };
        let runtime = Self {
            client: ChatClient::new(env, user_id, sync),
            session,
            router: EventRouter::new(queue),
            routed,
            acks: FuturesUnordered::new(),
            commands,
            updates,
            history,
            config,
        };
        (runtime, handle)
    }

    /// Run until shutdown is requested or every handle is dropped.
    ///
    /// # Errors
    ///
    /// Nothing inside the loop is fatal; failures are logged and turned into
    /// message state. The `Result` is kept for callers composing runtimes.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        self.router.bind(&mut self.session, None, &GLOBAL_EVENTS);
        self.load_conversations().await;
        self.session.connect();

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                signal = self.session.next_signal() => Step::Signal(signal),
                Some(event) = self.routed.recv() => Step::Event(event),
                Some(event) = self.acks.next(), if !self.acks.is_empty() => Step::Event(event),
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },
                _ = tick.tick() => Step::Event(ClientEvent::Tick),
            };

            match step {
                Step::Signal(signal) => self.session.handle_signal(signal),
                Step::Event(event) => {
                    let actions = self.client.handle(event);
                    self.execute(actions);
                },
                Step::Command(Command::Shutdown) | Step::Shutdown => break,
                Step::Command(command) => self.handle_command(command).await,
            }
        }

        info!("runtime shutting down");
        let actions = self.client.close_conversation();
        self.execute(actions);
        self.session.disconnect().await;
        Ok(())
    }

    async fn load_conversations(&mut self) {
        match self.history.fetch_conversations().await {
            Ok(summaries) => {
                debug!(count = summaries.len(), "loaded conversation summaries");
                let actions = self.client.seed_conversations(summaries);
                self.execute(actions);
            },
            Err(error) => warn!(%error, "conversation summaries unavailable"),
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let actions = match command {
            Command::Open(conversation_id) => {
                let seed = match self.history.fetch_conversation(&conversation_id).await {
                    Ok(seed) => seed,
                    Err(error) => {
                        warn!(%conversation_id, %error, "history unavailable, opening empty");
                        Default::default()
                    },
                };
                self.client.open_conversation(conversation_id, seed)
            },
            Command::Close => self.client.close_conversation(),
            Command::Keystroke => self.client.keystroke(),
            Command::Send(content) => self.client.send_message(&content),
            Command::Retry(message_id) => self.client.retry_message(&message_id),
            Command::Shutdown => Vec::new(),
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Emit(event) => {
                    if let Err(error) = self.emit(&event) {
                        warn!(event = event.name(), %error, "emit failed");
                    }
                },
                ClientAction::EmitWithAck { request_id, event, timeout } => {
                    let wait = match event.payload() {
                        Ok(payload) => self.session.emit_with_ack(event.name(), payload, timeout),
                        Err(error) => {
                            futures::future::ready(Err(SessionError::Protocol(error))).boxed()
                        },
                    };
                    self.acks.push(
                        async move {
                            match wait.await {
                                Ok(payload) => ClientEvent::AckReceived { request_id, payload },
                                Err(error) => ClientEvent::AckFailed {
                                    request_id,
                                    error: SyncError::from(error),
                                },
                            }
                        }
                        .boxed(),
                    );
                },
                ClientAction::BindView { scope, conversation_id } => {
                    debug!(%conversation_id, ?scope, "binding view events");
                    self.router.bind(&mut self.session, Some(scope), &VIEW_EVENTS);
                },
                ClientAction::UnbindView { scope } => {
                    self.router.unbind(&mut self.session, Some(scope));
                },
                ClientAction::Publish(update) => {
                    // No subscribers is fine.
                    let _ = self.updates.send(update);
                },
            }
        }
    }

    fn emit(&self, event: &OutboundEvent) -> Result<(), SessionError> {
        self.session.emit(event.name(), event.payload()?)
    }
}
