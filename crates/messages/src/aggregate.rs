//! Per-conversation summary rollup.

use chrono::{DateTime, Utc};

use crate::model::{CanonicalMessage, Direction, MessageType};

#[cfg(test)]
use crate::model::ConversationSummary;

/// Default length of `last_message_preview`, in characters.
pub const DEFAULT_PREVIEW_CHARS: usize = 50;

/// Change to apply to a conversation summary for one upserted message.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPatch {
    pub wa_id: String,
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub message_time: DateTime<Utc>,
    pub preview: String,
    pub message_type: MessageType,
    /// 1 for inbound messages, 0 otherwise.
    pub unread_increment: u32,
}

#[cfg(test)]
impl SummaryPatch {
    /// Fold this patch into the stored summary (or a fresh one), the way the
    /// SQL upsert in the store does.
    ///
    /// `last_message_time` never moves backwards; preview and type follow it.
    /// The unread counter only ever grows here.
    pub fn apply_to(self, existing: Option<ConversationSummary>, now: DateTime<Utc>) -> ConversationSummary {
        let Some(mut summary) = existing else {
            return ConversationSummary {
                contact_name: self.contact_name.unwrap_or_else(|| self.wa_id.clone()),
                wa_id: self.wa_id,
                phone_number: self.phone_number,
                last_message_time: self.message_time,
                last_message_preview: self.preview,
                last_message_type: self.message_type,
                unread_count: self.unread_increment,
                created_at: now,
                updated_at: now,
            };
        };

        if self.message_time >= summary.last_message_time {
            summary.last_message_time = self.message_time;
            summary.last_message_preview = self.preview;
            summary.last_message_type = self.message_type;
        }
        if let Some(name) = self.contact_name {
            summary.contact_name = name;
        }
        summary.unread_count = summary.unread_count.saturating_add(self.unread_increment);
        summary.updated_at = now;
        summary
    }
}

/// Builds [`SummaryPatch`]es from upserted messages.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    preview_chars: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl Aggregator {
    pub fn new(preview_chars: usize) -> Self {
        Self { preview_chars }
    }

    pub fn patch_for(&self, message: &CanonicalMessage) -> SummaryPatch {
        SummaryPatch {
            wa_id: message.wa_id.clone(),
            phone_number: message.phone_number.clone(),
            contact_name: message.contact_name.clone(),
            message_time: message.timestamp,
            preview: preview(&message.message_body, self.preview_chars),
            message_type: message.message_type,
            unread_increment: u32::from(message.direction == Direction::Inbound),
        }
    }
}

/// First `max_chars` characters of `body`.
pub fn preview(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::model::MessageStatus,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn message(direction: Direction, body: &str, secs: i64) -> CanonicalMessage {
        CanonicalMessage {
            id: format!("m{secs}"),
            meta_msg_id: None,
            wa_id: "111".into(),
            phone_number: "111".into(),
            contact_name: None,
            direction,
            message_type: MessageType::Text,
            message_body: body.into(),
            message_url: None,
            timestamp: at(secs),
            status: MessageStatus::Delivered,
            status_updated_at: None,
            webhook_metadata: serde_json::Value::Null,
            created_at: at(secs),
            updated_at: at(secs),
        }
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview(&"x".repeat(80), DEFAULT_PREVIEW_CHARS).len(), 50);
    }

    #[test]
    fn only_inbound_increments_unread() {
        let agg = Aggregator::default();
        assert_eq!(agg.patch_for(&message(Direction::Inbound, "a", 1)).unread_increment, 1);
        assert_eq!(agg.patch_for(&message(Direction::Outbound, "a", 1)).unread_increment, 0);
    }

    #[test]
    fn new_summary_falls_back_to_conversation_id_for_name() {
        let agg = Aggregator::default();
        let summary = agg
            .patch_for(&message(Direction::Inbound, "hi", 10))
            .apply_to(None, at(11));
        assert_eq!(summary.contact_name, "111");
        assert_eq!(summary.unread_count, 1);
        assert_eq!(summary.last_message_preview, "hi");
    }

    #[test]
    fn older_message_does_not_regress_last_message() {
        let agg = Aggregator::default();
        let newer = agg
            .patch_for(&message(Direction::Inbound, "newer", 20))
            .apply_to(None, at(21));
        let after = agg
            .patch_for(&message(Direction::Inbound, "older", 10))
            .apply_to(Some(newer), at(22));

        assert_eq!(after.last_message_time, at(20));
        assert_eq!(after.last_message_preview, "newer");
        assert_eq!(after.unread_count, 2);
    }
}
