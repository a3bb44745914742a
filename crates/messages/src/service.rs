//! The ingestion pipeline: normalize → upsert → aggregate → broadcast.

use std::sync::Arc;

use {
    chrono::Utc,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    aggregate::{Aggregator, DEFAULT_PREVIEW_CHARS},
    broadcast::MessageBroadcaster,
    history::{HistoryPage, PageRequest},
    model::{CanonicalMessage, ConversationSummary, Direction, MessageStatus, MessageType},
    normalize::{self, Event, Normalized, SkippedItem},
    store::{ConversationStore, MessageStore},
    upsert::{MessagePatch, Upserted},
};

/// Tunables for [`Inbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxOptions {
    pub preview_chars: usize,
    pub conversation_limit: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for InboxOptions {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
            conversation_limit: 100,
            default_page_size: 50,
            max_page_size: 200,
        }
    }
}

/// Outcome of one webhook delivery.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub shape: Option<&'static str>,
    /// Every record created or updated, in event order.
    pub messages: Vec<CanonicalMessage>,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedItem>,
    /// Events that normalized but could not be stored.
    pub failed: usize,
}

impl IngestReport {
    pub fn processed(&self) -> usize {
        self.messages.len()
    }
}

/// Body of an outbound send request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub wa_id: Option<String>,
    #[serde(default)]
    pub message_body: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
}

/// Ingestion and query service. Stores and the broadcaster are injected so
/// the pipeline runs unchanged against fakes.
pub struct Inbox {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    broadcaster: Arc<dyn MessageBroadcaster>,
    aggregator: Aggregator,
    options: InboxOptions,
}

impl Inbox {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        broadcaster: Arc<dyn MessageBroadcaster>,
        options: InboxOptions,
    ) -> Self {
        Self {
            messages,
            conversations,
            broadcaster,
            aggregator: Aggregator::new(options.preview_chars),
            options,
        }
    }

    pub fn options(&self) -> &InboxOptions {
        &self.options
    }

    /// Process a raw webhook body. Only an unparseable envelope fails the
    /// whole call; bad items are skipped and failed writes are counted.
    pub async fn ingest_webhook(&self, body: &[u8]) -> Result<IngestReport> {
        let normalized = normalize::normalize_bytes(body)?;
        Ok(self.ingest_normalized(normalized).await)
    }

    pub async fn ingest_envelope(&self, envelope: &Value) -> Result<IngestReport> {
        let normalized = normalize::normalize(envelope)?;
        Ok(self.ingest_normalized(normalized).await)
    }

    async fn ingest_normalized(&self, normalized: Normalized) -> IngestReport {
        #[cfg(feature = "metrics")]
        inbox_metrics::counter!(inbox_metrics::webhook::EVENTS_TOTAL)
            .increment(normalized.events.len() as u64);

        let mut report = IngestReport {
            shape: normalized.shape,
            skipped: normalized.skipped,
            ..Default::default()
        };

        for event in normalized.events {
            let id = event.id().to_string();
            let kind = event.kind();
            match self.ingest_event(event).await {
                Ok(upserted) => {
                    if upserted.created {
                        report.created += 1;
                    } else {
                        report.updated += 1;
                    }
                    report.messages.push(upserted.message);
                },
                Err(e) => {
                    warn!(id, kind, error = %e, "failed to store webhook event");
                    report.failed += 1;
                },
            }
        }

        info!(
            shape = report.shape,
            processed = report.processed(),
            created = report.created,
            updated = report.updated,
            skipped = report.skipped.len(),
            failed = report.failed,
            "webhook processed"
        );
        report
    }

    /// Upsert one event, roll message events into their conversation, then
    /// broadcast the stored record.
    pub async fn ingest_event(&self, event: Event) -> Result<Upserted> {
        let is_message = matches!(event, Event::Message(_));
        let upserted = self.messages.upsert(MessagePatch::from(event)).await?;
        record_upsert(&upserted);
        debug!(
            id = %upserted.message.id,
            wa_id = %upserted.message.wa_id,
            created = upserted.created,
            "upserted message"
        );

        if is_message {
            self.aggregate(&upserted.message).await;
        }
        self.publish(&upserted.message);
        Ok(upserted)
    }

    /// Record an outbound message. Nothing is sent to the carrier.
    pub async fn send_message(&self, request: SendMessage) -> Result<CanonicalMessage> {
        let wa_id = request
            .wa_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let body = request.message_body.filter(|s| !s.trim().is_empty());
        let (Some(wa_id), Some(body)) = (wa_id, body) else {
            return Err(Error::validation("wa_id and message_body are required"));
        };
        let message_type = match request.message_type.as_deref() {
            Some(t) => t.parse::<MessageType>()?,
            None => MessageType::Text,
        };

        let now = Utc::now();
        let patch = MessagePatch {
            id: uuid::Uuid::new_v4().to_string(),
            meta_msg_id: None,
            wa_id,
            contact_name: None,
            direction: Some(Direction::Outbound),
            message_type: Some(message_type),
            message_body: Some(body),
            message_url: None,
            timestamp: Some(now),
            status: Some(MessageStatus::Sent),
            status_updated_at: Some(now),
            metadata: serde_json::Map::new(),
        };

        let upserted = self.messages.upsert(patch).await?;
        record_upsert(&upserted);
        #[cfg(feature = "metrics")]
        inbox_metrics::counter!(inbox_metrics::messages::SENT_TOTAL).increment(1);
        info!(id = %upserted.message.id, wa_id = %upserted.message.wa_id, "recorded outbound message");
        self.aggregate(&upserted.message).await;
        self.publish(&upserted.message);
        Ok(upserted.message)
    }

    /// Manually set a message's status, matching either identifier.
    pub async fn update_status(&self, identifier: &str, status: &str) -> Result<CanonicalMessage> {
        let status: MessageStatus = status.parse()?;
        let updated = self
            .messages
            .update_status(identifier, status, Utc::now())
            .await?
            .ok_or_else(|| Error::not_found("message", identifier))?;
        debug!(id = %updated.id, %status, "updated message status");
        self.publish(&updated);
        Ok(updated)
    }

    /// Fetch a page of history and acknowledge the conversation as read.
    pub async fn history(
        &self,
        wa_id: &str,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<HistoryPage> {
        let request = PageRequest::new(
            page.unwrap_or(1),
            size.unwrap_or(self.options.default_page_size),
            self.options.max_page_size,
        )?;
        let rows = self
            .messages
            .list_newest_first(wa_id, request.offset(), request.fetch_limit())
            .await?;
        self.conversations.mark_read(wa_id).await?;
        Ok(HistoryPage::from_newest_first(rows, request))
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.conversations
            .list(self.options.conversation_limit)
            .await
    }

    /// Summary failures are logged; the message itself is already stored.
    async fn aggregate(&self, message: &CanonicalMessage) {
        let patch = self.aggregator.patch_for(message);
        if let Err(e) = self.conversations.apply(patch).await {
            warn!(wa_id = %message.wa_id, error = %e, "failed to update conversation summary");
        }
    }

    fn publish(&self, message: &CanonicalMessage) {
        match self.broadcaster.publish(message) {
            Ok(receivers) => {
                debug!(id = %message.id, receivers, "broadcast message update");
            },
            Err(e) => {
                warn!(id = %message.id, error = %e, "broadcast failed");
            },
        }
    }
}

fn record_upsert(upserted: &Upserted) {
    #[cfg(feature = "metrics")]
    {
        let name = if upserted.created {
            inbox_metrics::messages::CREATED_TOTAL
        } else {
            inbox_metrics::messages::UPDATED_TOTAL
        };
        inbox_metrics::counter!(name).increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = upserted;
}
