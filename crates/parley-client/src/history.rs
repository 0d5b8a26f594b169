//! REST boundary for history and conversation summaries.
//!
//! Fetching is outside the synchronizer; the runtime consults a
//! [`HistorySource`] before opening a view and once at startup.

use std::{collections::HashMap, future::Future};

use parley_core::{ConversationSeed, ConversationSummary};
use parley_proto::ConversationId;
use thiserror::Error;

/// History retrieval errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The source has no such conversation.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// The source could not be reached.
    #[error("history unavailable: {0}")]
    Unavailable(String),
}

/// Source of conversation history and summaries.
pub trait HistorySource: Send + Sync + 'static {
    /// Transcript and participants of one conversation.
    fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> impl Future<Output = Result<ConversationSeed, HistoryError>> + Send;

    /// Summaries of every conversation the user belongs to.
    fn fetch_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<ConversationSummary>, HistoryError>> + Send;
}

/// History source with nothing in it. Views open empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    async fn fetch_conversation(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<ConversationSeed, HistoryError> {
        Ok(ConversationSeed::default())
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, HistoryError> {
        Ok(Vec::new())
    }
}

/// Fixed in-memory history.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory {
    summaries: Vec<ConversationSummary>,
    seeds: HashMap<ConversationId, ConversationSeed>,
}

impl StaticHistory {
    /// Add a conversation with its summary and seed.
    #[must_use]
    pub fn with_conversation(mut self, summary: ConversationSummary, seed: ConversationSeed) -> Self {
        self.seeds.insert(summary.id.clone(), seed);
        self.summaries.push(summary);
        self
    }
}

impl HistorySource for StaticHistory {
    async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationSeed, HistoryError> {
        self.seeds
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(conversation_id.clone()))
    }

    async fn fetch_conversations(&self) -> Result<Vec<ConversationSummary>, HistoryError> {
        Ok(self.summaries.clone())
    }
}

#[cfg(test)]
mod tests {
    use parley_core::ConversationKind;

    use super::*;

    #[tokio::test]
    async fn static_history_serves_seeds_by_id() {
        let id = ConversationId::new("c1").expect("id");
        let history = StaticHistory::default().with_conversation(
            ConversationSummary::new(id.clone(), "Team", ConversationKind::Group),
            ConversationSeed::default(),
        );

        assert_eq!(history.fetch_conversations().await.map(|s| s.len()), Ok(1));
        assert_eq!(history.fetch_conversation(&id).await, Ok(ConversationSeed::default()));

        let missing = ConversationId::new("c2").expect("id");
        assert_eq!(history.fetch_conversation(&missing).await, Err(HistoryError::NotFound(missing)));
    }
}
