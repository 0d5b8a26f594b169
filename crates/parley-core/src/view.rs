//! State of the single open conversation.

use std::{ops::Sub, time::Duration};

use parley_proto::{ConversationId, UserId};

use crate::{Message, MessageId, TypingDebounce, TypingPresence};

/// Identifies one opening of a conversation view.
///
/// Event subscriptions are bound to a scope; events tagged with a scope other
/// than the open view's are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

/// Room membership phase of the open view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    /// Waiting for a connection before joining the room.
    Joining,
    /// Joined; room events are flowing.
    Active,
}

/// Conversation member as shown in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Member identifier.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
}

/// Fetched history used to populate a freshly opened view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSeed {
    /// Transcript, oldest first.
    pub messages: Vec<Message>,
    /// Members.
    pub participants: Vec<Participant>,
}

/// The open conversation.
#[derive(Debug, Clone)]
pub struct ConversationView<I> {
    conversation_id: ConversationId,
    scope: ScopeId,
    phase: ViewPhase,
    messages: Vec<Message>,
    participants: Vec<Participant>,
    pub(crate) typing: TypingPresence,
    pub(crate) debounce: TypingDebounce<I>,
}

impl<I> ConversationView<I>
where
    I: Copy + Sub<Output = Duration>,
{
    pub(crate) fn new(
        conversation_id: ConversationId,
        scope: ScopeId,
        seed: ConversationSeed,
        typing_idle: Duration,
    ) -> Self {
        let mut view = Self {
            conversation_id,
            scope,
            phase: ViewPhase::Joining,
            messages: Vec::with_capacity(seed.messages.len()),
            participants: seed.participants,
            typing: TypingPresence::default(),
            debounce: TypingDebounce::new(typing_idle),
        };
        for message in seed.messages {
            view.append(message);
        }
        view
    }

    /// Conversation shown.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Subscription scope of this opening.
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Membership phase.
    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Transcript, in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Members.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Remote users currently typing.
    pub fn typing_users(&self) -> Vec<UserId> {
        self.typing.snapshot()
    }

    /// Returns true while the local user is in a typing burst.
    pub fn is_local_typing(&self) -> bool {
        self.debounce.is_active()
    }

    pub(crate) fn set_phase(&mut self, phase: ViewPhase) {
        self.phase = phase;
    }

    /// Append unless a message with the same identifier is already shown.
    pub(crate) fn append(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|existing| existing.id == message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace the message known as `previous_id`.
    ///
    /// If the server echo of the message already arrived under its durable
    /// identifier, the echo is dropped and the original position kept.
    pub(crate) fn replace(&mut self, previous_id: &MessageId, message: Message) -> bool {
        let Some(mut index) = self.messages.iter().position(|existing| &existing.id == previous_id)
        else {
            return false;
        };

        if &message.id != previous_id {
            if let Some(echo) = self.messages.iter().position(|existing| existing.id == message.id) {
                self.messages.remove(echo);
                if echo < index {
                    index -= 1;
                }
            }
        }

        match self.messages.get_mut(index) {
            Some(slot) => {
                *slot = message;
                true
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::DeliveryStatus;

    fn message(id: MessageId, text: &str) -> Message {
        Message {
            id,
            sender_id: UserId::new("u1").expect("id"),
            content: text.into(),
            created_at: DateTime::default(),
            status: DeliveryStatus::Delivered,
            last_error: None,
        }
    }

    fn server(id: &str) -> MessageId {
        MessageId::Server(id.into())
    }

    fn view(messages: Vec<Message>) -> ConversationView<Duration> {
        let seed = ConversationSeed { messages, participants: Vec::new() };
        ConversationView::new(
            ConversationId::new("c1").expect("id"),
            ScopeId(1),
            seed,
            Duration::from_secs(1),
        )
    }

    fn ids(view: &ConversationView<Duration>) -> Vec<String> {
        view.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn seed_is_deduplicated() {
        let view = view(vec![message(server("m1"), "a"), message(server("m1"), "a")]);
        assert_eq!(ids(&view), ["m1"]);
        assert_eq!(view.phase(), ViewPhase::Joining);
    }

    #[test]
    fn replace_swaps_identifier_in_place() {
        let mut view = view(vec![message(MessageId::Local(1), "hi"), message(server("m0"), "later")]);

        assert!(view.replace(&MessageId::Local(1), message(server("m1"), "hi")));
        assert_eq!(ids(&view), ["m1", "m0"]);
    }

    #[test]
    fn replace_collapses_early_echo() {
        let mut view = view(vec![message(MessageId::Local(1), "hi")]);
        assert!(view.append(message(server("m1"), "hi")));

        assert!(view.replace(&MessageId::Local(1), message(server("m1"), "hi")));
        assert_eq!(ids(&view), ["m1"]);
        assert!(!view.append(message(server("m1"), "hi")));
    }

    #[test]
    fn replace_of_unknown_message_is_a_no_op() {
        let mut view = view(Vec::new());
        assert!(!view.replace(&MessageId::Local(9), message(server("m9"), "x")));
        assert!(view.messages().is_empty());
    }
}
