use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Result,
    aggregate::SummaryPatch,
    model::{CanonicalMessage, ConversationSummary, MessageStatus},
    upsert::{MessagePatch, Upserted},
};

/// Persistent message storage.
///
/// Implementations must make [`MessageStore::upsert`] atomic per identifier
/// at the storage layer: concurrent calls naming the same identifier, from
/// this process or another, never produce two records.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create or merge using the dual-key rules in [`crate::upsert`].
    async fn upsert(&self, patch: MessagePatch) -> Result<Upserted>;

    /// Set the status of the record matching `identifier` through either key.
    /// Returns `None` when nothing matches.
    async fn update_status(
        &self,
        identifier: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<CanonicalMessage>>;

    /// A conversation's messages, newest first.
    async fn list_newest_first(
        &self,
        wa_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CanonicalMessage>>;
}

/// Persistent conversation summaries.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Atomically fold `patch` into the summary, creating it if needed.
    async fn apply(&self, patch: SummaryPatch) -> Result<ConversationSummary>;

    /// Read-acknowledgement: reset the unread counter to zero.
    async fn mark_read(&self, wa_id: &str) -> Result<()>;

    /// Summaries by `last_message_time` descending.
    async fn list(&self, limit: u32) -> Result<Vec<ConversationSummary>>;
}
