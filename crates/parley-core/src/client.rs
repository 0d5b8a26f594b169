//! Conversation synchronizer.
//!
//! [`ChatClient`] is the single owner of client-side chat state: the
//! conversation list, the open view and every undelivered message. It is a
//! pure state machine. User intents and routed server events go in; a list of
//! [`ClientAction`]s comes out for the runtime to execute.
//!
//! # Lifecycle of the open view
//!
//! ```text
//! open ──► Joining ──(connected)──► Active ──(disconnected)──► Joining
//!   ▲                                  │
//!   └──────────── close ◄──────────────┘
//! ```
//!
//! Entering `Active` emits `join_conversation` and a read receipt, and zeroes
//! the unread count locally. This repeats after every reconnection because the
//! server forgets room membership with the connection.

use parley_proto::{
    ConversationId, InboundEvent, OutboundEvent, UserId,
    payloads::{ConversationMember, ConversationUpdated, MessageReceived, SendAck},
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    ClientAction, ClientEvent, ConnectionState, ConversationList, ConversationSeed,
    ConversationSummary, ConversationView, DeliveryAction, DeliveryCoordinator, Environment,
    Message, MessageId, RequestId, ScopeId, SyncConfig, SyncError, Update, ViewPhase,
};

/// Client-side chat state machine.
#[derive(Debug)]
pub struct ChatClient<E: Environment> {
    env: E,
    config: SyncConfig,
    user_id: UserId,
    connection: ConnectionState,
    conversations: ConversationList,
    delivery: DeliveryCoordinator<E::Instant>,
    view: Option<ConversationView<E::Instant>>,
    next_scope: u64,
}

impl<E: Environment> ChatClient<E> {
    /// Create a disconnected client for `user_id`.
    pub fn new(env: E, user_id: UserId, config: SyncConfig) -> Self {
        Self {
            delivery: DeliveryCoordinator::new(&config),
            conversations: ConversationList::new(user_id.clone()),
            env,
            config,
            user_id,
            connection: ConnectionState::Disconnected,
            view: None,
            next_scope: 1,
        }
    }

    /// Local user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Connection state as last reported by the transport.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Conversation list.
    pub fn conversations(&self) -> &ConversationList {
        &self.conversations
    }

    /// Open conversation, if any.
    pub fn view(&self) -> Option<&ConversationView<E::Instant>> {
        self.view.as_ref()
    }

    /// Undelivered messages.
    pub fn delivery(&self) -> &DeliveryCoordinator<E::Instant> {
        &self.delivery
    }

    /// Process an event.
    pub fn handle(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        match event {
            ClientEvent::Inbound { scope, event } => self.handle_inbound(scope, event),
            ClientEvent::AckReceived { request_id, payload } => self.handle_ack(request_id, &payload),
            ClientEvent::AckFailed { request_id, error } => {
                let now = self.env.now();
                let deliveries = self.delivery.handle_failure(request_id, &error, now);
                self.apply_delivery(deliveries)
            },
            ClientEvent::Tick => self.handle_tick(),
        }
    }

    /// Merge fetched conversation summaries into the list.
    pub fn seed_conversations(&mut self, summaries: Vec<ConversationSummary>) -> Vec<ClientAction> {
        for summary in summaries {
            self.conversations.enrich(summary);
        }
        vec![self.conversations_update()]
    }

    /// Open a conversation, closing the current one first.
    ///
    /// The unread count is zeroed locally right away. If connected the view
    /// joins the room immediately, otherwise on the next connection.
    pub fn open_conversation(
        &mut self,
        conversation_id: ConversationId,
        seed: ConversationSeed,
    ) -> Vec<ClientAction> {
        let mut actions = self.close_conversation();

        let scope = ScopeId(self.next_scope);
        self.next_scope += 1;

        let mut view = ConversationView::new(conversation_id.clone(), scope, seed, self.config.typing_idle);
        for message in self.delivery.pending_for(&conversation_id) {
            view.append(message.clone());
        }
        self.view = Some(view);
        info!(%conversation_id, ?scope, "opened conversation");

        actions.push(ClientAction::BindView { scope, conversation_id: conversation_id.clone() });
        if self.connection.is_connected() {
            actions.extend(self.activate());
        } else {
            actions.extend(self.mark_read_locally(&conversation_id));
        }
        actions.extend(self.transcript_update());
        actions
    }

    /// Close the open conversation.
    ///
    /// Ends a typing burst and leaves the room when joined, then releases the
    /// view's subscriptions. Undelivered messages keep being delivered.
    pub fn close_conversation(&mut self) -> Vec<ClientAction> {
        let Some(mut view) = self.view.take() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        let was_typing = view.debounce.cancel();
        if view.phase() == ViewPhase::Active {
            if was_typing {
                actions.push(ClientAction::Emit(OutboundEvent::UserStopTyping(
                    self.member(view.conversation_id()),
                )));
            }
            actions.push(ClientAction::Emit(OutboundEvent::LeaveConversation(
                view.conversation_id().clone(),
            )));
        }
        actions.push(ClientAction::UnbindView { scope: view.scope() });
        info!(conversation_id = %view.conversation_id(), "closed conversation");
        actions
    }

    /// A keystroke in the composer.
    ///
    /// Emits `user_typing` on the leading edge of a burst.
    pub fn keystroke(&mut self) -> Vec<ClientAction> {
        let now = self.env.now();
        let Some(view) = self.view.as_mut() else {
            return Vec::new();
        };
        // A burst started before joining would never announce itself.
        if view.phase() != ViewPhase::Active || !view.debounce.keystroke(now) {
            return Vec::new();
        }
        let member = member_of(&self.user_id, view.conversation_id());
        vec![ClientAction::Emit(OutboundEvent::UserTyping(member))]
    }

    /// Submit a message to the open conversation.
    ///
    /// Blank content is ignored. An active typing burst ends first.
    pub fn send_message(&mut self, content: &str) -> Vec<ClientAction> {
        let content = content.trim();
        if content.is_empty() {
            return Vec::new();
        }
        let now = self.env.now();
        let created_at = self.env.wall_clock();

        let Some(view) = self.view.as_mut() else {
            warn!("message submitted without an open conversation");
            return Vec::new();
        };

        let mut actions = Vec::new();
        let conversation_id = view.conversation_id().clone();
        if view.debounce.cancel() && view.phase() == ViewPhase::Active {
            actions.push(ClientAction::Emit(OutboundEvent::UserStopTyping(member_of(
                &self.user_id,
                &conversation_id,
            ))));
        }

        let deliveries = self.delivery.send(
            conversation_id.clone(),
            self.user_id.clone(),
            content.to_owned(),
            created_at,
            now,
        );
        actions.extend(self.apply_delivery(deliveries));
        actions.push(ClientAction::Publish(Update::ComposerCleared { conversation_id }));
        actions
    }

    /// Retry an errored message on request.
    pub fn retry_message(&mut self, message_id: &MessageId) -> Vec<ClientAction> {
        let now = self.env.now();
        let deliveries = self.delivery.retry(message_id, now);
        self.apply_delivery(deliveries)
    }

    fn handle_inbound(&mut self, scope: Option<ScopeId>, event: InboundEvent) -> Vec<ClientAction> {
        match event {
            InboundEvent::Connected => self.handle_connected(),
            InboundEvent::Disconnected { reason } => self.handle_disconnected(&reason),
            InboundEvent::ConnectError { reason } => {
                warn!(%reason, "connection attempt failed");
                Vec::new()
            },
            InboundEvent::MessageReceived(message) => self.handle_message_received(scope, message),
            InboundEvent::UserTyping(member) => self.handle_remote_typing(scope, member, true),
            InboundEvent::UserStopTyping(member) => self.handle_remote_typing(scope, member, false),
            InboundEvent::AllMessagesRead(receipt) | InboundEvent::MessageRead(receipt) => {
                self.mark_read_locally(&receipt.conversation_id).into_iter().collect()
            },
            InboundEvent::ConversationUpdated(update) => self.handle_conversation_updated(&update),
        }
    }

    fn handle_connected(&mut self) -> Vec<ClientAction> {
        if self.connection.is_connected() {
            debug!("already connected");
            return Vec::new();
        }
        self.connection = ConnectionState::Connected;
        info!("connected");

        let mut actions = vec![ClientAction::Publish(Update::Connection(self.connection))];
        actions.extend(self.activate());

        let now = self.env.now();
        let deliveries = self.delivery.resume_errored(now);
        actions.extend(self.apply_delivery(deliveries));
        actions
    }

    fn handle_disconnected(&mut self, reason: &str) -> Vec<ClientAction> {
        if !self.connection.is_connected() {
            debug!(%reason, "already disconnected");
            return Vec::new();
        }
        self.connection = ConnectionState::Disconnected;
        info!(%reason, "disconnected");

        let mut actions = vec![ClientAction::Publish(Update::Connection(self.connection))];
        if let Some(view) = self.view.as_mut() {
            view.set_phase(ViewPhase::Joining);
            view.debounce.cancel();
            if view.typing.clear() {
                actions.push(ClientAction::Publish(Update::Typing {
                    conversation_id: view.conversation_id().clone(),
                    users: Vec::new(),
                }));
            }
        }
        actions
    }

    fn handle_message_received(
        &mut self,
        scope: Option<ScopeId>,
        received: MessageReceived,
    ) -> Vec<ClientAction> {
        let fallback = self.env.wall_clock();
        let Some(view) = self.view.as_mut().filter(|view| in_scope(view.scope(), scope)) else {
            debug!(message_id = %received.message_id, "message outside the open view dropped");
            return Vec::new();
        };
        if received.conversation_id.as_ref().is_some_and(|id| id != view.conversation_id()) {
            debug!(message_id = %received.message_id, "message for another conversation dropped");
            return Vec::new();
        }

        let from_other = received.user_id != self.user_id;
        if !view.append(Message::received(received, fallback)) {
            debug!("duplicate message ignored");
            return Vec::new();
        }
        let conversation_id = view.conversation_id().clone();
        let acknowledge = from_other && self.config.read_on_receive && view.phase() == ViewPhase::Active;

        let mut actions: Vec<ClientAction> = self.transcript_update().into_iter().collect();
        if acknowledge {
            actions.push(ClientAction::Emit(OutboundEvent::AllMessagesRead(
                self.member(&conversation_id),
            )));
            actions.extend(self.mark_read_locally(&conversation_id));
        }
        actions
    }

    fn handle_remote_typing(
        &mut self,
        scope: Option<ScopeId>,
        member: ConversationMember,
        started: bool,
    ) -> Vec<ClientAction> {
        if member.user_id == self.user_id {
            return Vec::new();
        }
        let Some(view) = self.view.as_mut().filter(|view| in_scope(view.scope(), scope)) else {
            return Vec::new();
        };
        if &member.conversation_id != view.conversation_id() {
            return Vec::new();
        }

        let changed = if started {
            view.typing.insert(member.user_id)
        } else {
            view.typing.remove(&member.user_id)
        };
        if !changed {
            return Vec::new();
        }
        vec![ClientAction::Publish(Update::Typing {
            conversation_id: member.conversation_id,
            users: view.typing_users(),
        })]
    }

    fn handle_conversation_updated(&mut self, update: &ConversationUpdated) -> Vec<ClientAction> {
        self.conversations.apply_update(update);

        // The open, joined conversation is read as it updates; the matching
        // receipt goes out with the message itself.
        let viewing = self.view.as_ref().is_some_and(|view| {
            view.conversation_id() == &update.conversation_id && view.phase() == ViewPhase::Active
        });
        if viewing && self.config.read_on_receive {
            if let Err(error) = self.conversations.mark_read(&update.conversation_id) {
                warn!(%error, "read reconciliation failed");
            }
        }
        vec![self.conversations_update()]
    }

    fn handle_ack(&mut self, request_id: RequestId, payload: &Value) -> Vec<ClientAction> {
        let now = self.env.now();
        let deliveries = match SendAck::from_value(payload) {
            Ok(ack) => self.delivery.handle_ack(request_id, &ack, now),
            Err(error) => {
                warn!(%request_id, %error, "unreadable acknowledgement");
                self.delivery.handle_failure(request_id, &SyncError::Rejected(error.to_string()), now)
            },
        };
        self.apply_delivery(deliveries)
    }

    fn handle_tick(&mut self) -> Vec<ClientAction> {
        let now = self.env.now();
        let deliveries = self.delivery.handle_tick(now, self.connection.is_connected());
        let mut actions = self.apply_delivery(deliveries);

        if let Some(view) = self.view.as_mut() {
            if view.debounce.poll_expired(now) && view.phase() == ViewPhase::Active {
                actions.push(ClientAction::Emit(OutboundEvent::UserStopTyping(member_of(
                    &self.user_id,
                    view.conversation_id(),
                ))));
            }
        }
        actions
    }

    /// Join the open view's room.
    fn activate(&mut self) -> Vec<ClientAction> {
        let Some(view) = self.view.as_mut() else {
            return Vec::new();
        };
        view.set_phase(ViewPhase::Active);
        let conversation_id = view.conversation_id().clone();
        let member = self.member(&conversation_id);
        debug!(%conversation_id, "joining conversation");

        let mut actions = vec![
            ClientAction::Emit(OutboundEvent::JoinConversation(member.clone())),
            ClientAction::Emit(OutboundEvent::AllMessagesRead(member)),
        ];
        actions.extend(self.mark_read_locally(&conversation_id));
        actions
    }

    fn mark_read_locally(&mut self, conversation_id: &ConversationId) -> Option<ClientAction> {
        match self.conversations.mark_read(conversation_id) {
            Ok(true) => Some(self.conversations_update()),
            Ok(false) => None,
            Err(error) => {
                warn!(%error, "read reconciliation failed");
                None
            },
        }
    }

    /// Route delivery changes into the open transcript.
    fn apply_delivery(&mut self, deliveries: Vec<DeliveryAction>) -> Vec<ClientAction> {
        let mut actions = Vec::new();
        let mut transcript_changed = false;

        for delivery in deliveries {
            match delivery {
                DeliveryAction::Appended { conversation_id, message } => {
                    if let Some(view) = self.view_of(&conversation_id) {
                        transcript_changed |= view.append(message);
                    }
                },
                DeliveryAction::Updated { conversation_id, previous_id, message } => {
                    if let Some(view) = self.view_of(&conversation_id) {
                        transcript_changed |= view.replace(&previous_id, message);
                    }
                },
                DeliveryAction::Dispatch { request_id, payload, timeout } => {
                    actions.push(ClientAction::EmitWithAck {
                        request_id,
                        event: OutboundEvent::SendMessage(payload),
                        timeout,
                    });
                },
            }
        }

        if transcript_changed {
            actions.extend(self.transcript_update());
        }
        actions
    }

    fn view_of(&mut self, conversation_id: &ConversationId) -> Option<&mut ConversationView<E::Instant>> {
        self.view.as_mut().filter(|view| view.conversation_id() == conversation_id)
    }

    fn member(&self, conversation_id: &ConversationId) -> ConversationMember {
        member_of(&self.user_id, conversation_id)
    }

    fn transcript_update(&self) -> Option<ClientAction> {
        self.view.as_ref().map(|view| {
            ClientAction::Publish(Update::Transcript {
                conversation_id: view.conversation_id().clone(),
                messages: view.messages().to_vec(),
            })
        })
    }

    fn conversations_update(&self) -> ClientAction {
        ClientAction::Publish(Update::Conversations(self.conversations.entries().to_vec()))
    }
}

fn member_of(user_id: &UserId, conversation_id: &ConversationId) -> ConversationMember {
    ConversationMember { conversation_id: conversation_id.clone(), user_id: user_id.clone() }
}

/// Unscoped events are accepted; scoped ones must match the open view.
fn in_scope(view: ScopeId, event: Option<ScopeId>) -> bool {
    event.is_none_or(|scope| scope == view)
}
