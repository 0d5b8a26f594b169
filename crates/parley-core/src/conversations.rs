//! Conversation list reconciliation.
//!
//! Keeps the summary list consistent with `conversation_updated` and read
//! receipts regardless of which conversation is open.
//!
//! # Invariants
//!
//! - Identifiers are unique within the list.
//! - The unread count only grows for updates authored by someone other than
//!   the local user, and only shrinks to zero through a read.
//! - A summary field is only overwritten by an update at least as recent as
//!   the one that last wrote it.

use chrono::{DateTime, Utc};
use parley_proto::{ConversationId, UserId, payloads::ConversationUpdated};
use tracing::debug;

use crate::SyncError;

/// Conversation flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationKind {
    /// One-to-one.
    #[default]
    Direct,
    /// Named group.
    Group,
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Title shown in the list.
    pub display_name: String,
    /// Direct or group.
    pub kind: ConversationKind,
    /// Text of the newest message.
    pub last_message: Option<String>,
    /// Time of the newest message.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Author of the newest message.
    pub last_sender_id: Option<UserId>,
    /// Messages from others not yet read.
    pub unread_count: u32,
    /// Number of members.
    pub participant_count: u32,
}

impl ConversationSummary {
    /// Summary with no messages.
    pub fn new(id: ConversationId, display_name: impl Into<String>, kind: ConversationKind) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            kind,
            last_message: None,
            last_message_at: None,
            last_sender_id: None,
            unread_count: 0,
            participant_count: 0,
        }
    }

    /// Minimal entry for a conversation known only from an update.
    fn placeholder(id: ConversationId) -> Self {
        let display_name = id.to_string();
        Self::new(id, display_name, ConversationKind::default())
    }

    /// Whether an update stamped `at` is at least as recent as what we hold.
    fn accepts(&self, at: Option<DateTime<Utc>>) -> bool {
        match (self.last_message_at, at) {
            (Some(current), Some(incoming)) => incoming >= current,
            _ => true,
        }
    }

    fn apply(&mut self, update: &ConversationUpdated) {
        if let Some(text) = &update.last_message {
            self.last_message = Some(text.clone());
        }
        if let Some(at) = update.last_message_at {
            self.last_message_at = Some(at);
        }
        if let Some(sender) = &update.sender_id {
            self.last_sender_id = Some(sender.clone());
        }
    }
}

/// Ordered conversation summaries, most recently active first.
#[derive(Debug, Clone)]
pub struct ConversationList {
    local_user: UserId,
    entries: Vec<ConversationSummary>,
}

impl ConversationList {
    /// Empty list for `local_user`.
    pub fn new(local_user: UserId) -> Self {
        Self { local_user, entries: Vec::new() }
    }

    /// Summaries in display order.
    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    /// Look up a summary.
    pub fn get(&self, id: &ConversationId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Unread count of a listed conversation.
    pub fn unread_count(&self, id: &ConversationId) -> Option<u32> {
        self.get(id).map(|entry| entry.unread_count)
    }

    /// Merge a fetched summary.
    ///
    /// Unknown conversations are appended. Known ones take the descriptive
    /// fields and any newer last-message fields, but keep the locally tracked
    /// unread count.
    pub fn enrich(&mut self, summary: ConversationSummary) {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == summary.id) else {
            self.entries.push(summary);
            return;
        };

        entry.display_name = summary.display_name;
        entry.kind = summary.kind;
        entry.participant_count = summary.participant_count;
        if summary.last_message_at.is_some() && entry.accepts(summary.last_message_at) {
            entry.last_message = summary.last_message;
            entry.last_message_at = summary.last_message_at;
            entry.last_sender_id = summary.last_sender_id;
        }
    }

    /// Apply a `conversation_updated` event.
    ///
    /// An update for an unknown conversation synthesizes a minimal entry at
    /// the top of the list.
    pub fn apply_update(&mut self, update: &ConversationUpdated) {
        let from_other = update.sender_id.as_ref() != Some(&self.local_user);

        let index = match self.entries.iter().position(|entry| entry.id == update.conversation_id) {
            Some(index) => index,
            None => {
                debug!(conversation_id = %update.conversation_id, "synthesizing summary for unknown conversation");
                self.entries.insert(0, ConversationSummary::placeholder(update.conversation_id.clone()));
                0
            },
        };
        let mut entry = self.entries.remove(index);

        let fresh = entry.accepts(update.last_message_at);
        if fresh {
            entry.apply(update);
        } else {
            debug!(conversation_id = %entry.id, "stale conversation update");
        }
        if from_other {
            entry.unread_count = entry.unread_count.saturating_add(1);
        }

        let position = if fresh { 0 } else { index };
        self.entries.insert(position, entry);
    }

    /// Zero the unread count. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// - `SyncError::ReconciliationMiss` if the conversation is not listed
    pub fn mark_read(&mut self, id: &ConversationId) -> Result<bool, SyncError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| &entry.id == id)
            .ok_or_else(|| SyncError::ReconciliationMiss { conversation_id: id.clone() })?;
        let changed = entry.unread_count != 0;
        entry.unread_count = 0;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(raw: &str) -> ConversationId {
        ConversationId::new(raw).expect("id")
    }

    fn uid(raw: &str) -> UserId {
        UserId::new(raw).expect("id")
    }

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(secs, 0)
    }

    fn update(conversation: &str, sender: &str, text: &str, secs: i64) -> ConversationUpdated {
        ConversationUpdated {
            conversation_id: cid(conversation),
            last_message: Some(text.into()),
            last_message_at: at(secs),
            sender_id: Some(uid(sender)),
        }
    }

    fn list() -> ConversationList {
        let mut list = ConversationList::new(uid("me"));
        list.enrich(ConversationSummary::new(cid("a"), "Alice", ConversationKind::Direct));
        list.enrich(ConversationSummary::new(cid("b"), "Book club", ConversationKind::Group));
        list
    }

    fn order(list: &ConversationList) -> Vec<&str> {
        list.entries().iter().map(|entry| entry.id.as_str()).collect()
    }

    #[test]
    fn update_from_other_increments_unread_and_moves_to_top() {
        let mut list = list();
        list.apply_update(&update("b", "bob", "hi", 10));

        assert_eq!(order(&list), ["b", "a"]);
        let entry = list.get(&cid("b")).expect("entry");
        assert_eq!(entry.unread_count, 1);
        assert_eq!(entry.last_message.as_deref(), Some("hi"));
        assert_eq!(entry.last_sender_id, Some(uid("bob")));
    }

    #[test]
    fn own_messages_do_not_count_as_unread() {
        let mut list = list();
        list.apply_update(&update("a", "me", "sent from another device", 10));
        assert_eq!(list.unread_count(&cid("a")), Some(0));
        assert_eq!(list.get(&cid("a")).and_then(|e| e.last_message.as_deref()), Some("sent from another device"));
    }

    #[test]
    fn unknown_conversation_is_synthesized_at_top() {
        let mut list = list();
        list.apply_update(&update("z", "zed", "new here", 10));

        assert_eq!(order(&list), ["z", "a", "b"]);
        let entry = list.get(&cid("z")).expect("entry");
        assert_eq!(entry.display_name, "z");
        assert_eq!(entry.unread_count, 1);
    }

    #[test]
    fn stale_update_keeps_newer_fields() {
        let mut list = list();
        list.apply_update(&update("a", "alice", "second", 20));
        list.apply_update(&update("b", "bob", "other", 30));
        list.apply_update(&update("a", "alice", "first", 10));

        let entry = list.get(&cid("a")).expect("entry");
        assert_eq!(entry.last_message.as_deref(), Some("second"));
        assert_eq!(entry.last_message_at, at(20));
        assert_eq!(entry.unread_count, 2);
        assert_eq!(order(&list), ["b", "a"]);
    }

    #[test]
    fn mark_read_zeroes_or_reports_miss() {
        let mut list = list();
        list.apply_update(&update("a", "alice", "hi", 10));

        assert_eq!(list.mark_read(&cid("a")), Ok(true));
        assert_eq!(list.mark_read(&cid("a")), Ok(false));
        assert_eq!(
            list.mark_read(&cid("nope")),
            Err(SyncError::ReconciliationMiss { conversation_id: cid("nope") })
        );
    }

    #[test]
    fn enrich_keeps_local_unread_count() {
        let mut list = list();
        list.apply_update(&update("a", "alice", "hi", 10));

        let mut fetched = ConversationSummary::new(cid("a"), "Alice Liddell", ConversationKind::Direct);
        fetched.participant_count = 2;
        list.enrich(fetched);

        let entry = list.get(&cid("a")).expect("entry");
        assert_eq!(entry.display_name, "Alice Liddell");
        assert_eq!(entry.participant_count, 2);
        assert_eq!(entry.unread_count, 1);
        assert_eq!(entry.last_message.as_deref(), Some("hi"));
    }
}
