//! WhatsApp webhook ingestion.
//!
//! Raw deliveries are normalized into message and status events, merged into
//! canonical records keyed by either of two identifiers, rolled up into
//! per-conversation summaries, and fanned out to live subscribers. Storage and
//! fan-out sit behind the [`MessageStore`], [`ConversationStore`] and
//! [`MessageBroadcaster`] traits.

pub mod aggregate;
pub mod broadcast;
pub mod envelope;
pub mod error;
pub mod history;
pub mod model;
pub mod normalize;
pub mod service;
pub mod store;
pub mod upsert;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod testing;

pub use {
    aggregate::{Aggregator, DEFAULT_PREVIEW_CHARS, SummaryPatch},
    broadcast::{MessageBroadcaster, NoopBroadcaster},
    error::{Error, Result},
    history::{HistoryPage, PageRequest},
    model::{CanonicalMessage, ConversationSummary, Direction, MessageStatus, MessageType},
    normalize::{Event, MessageEvent, Normalized, SkippedItem, StatusEvent, normalize, normalize_bytes},
    service::{Inbox, InboxOptions, IngestReport, SendMessage},
    store::{ConversationStore, MessageStore},
    upsert::{MessagePatch, UpsertPlan, Upserted, plan_upsert},
};
