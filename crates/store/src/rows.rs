//! Row types for sqlx mapping and their conversions.

use {
    chrono::{DateTime, Utc},
    inbox_messages::{CanonicalMessage, ConversationSummary, Error, Result},
};

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::malformed(format!("stored timestamp {ms} out of range")))
}

/// Current time at the precision the database stores.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

#[derive(sqlx::FromRow)]
pub(crate) struct MessageRow {
    id: String,
    meta_msg_id: Option<String>,
    wa_id: String,
    phone_number: String,
    contact_name: Option<String>,
    direction: String,
    message_type: String,
    message_body: String,
    message_url: Option<String>,
    timestamp: i64,
    status: String,
    status_updated_at: Option<i64>,
    webhook_metadata: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MessageRow> for CanonicalMessage {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            direction: r.direction.parse()?,
            message_type: r.message_type.parse()?,
            status: r.status.parse()?,
            timestamp: from_millis(r.timestamp)?,
            status_updated_at: r.status_updated_at.map(from_millis).transpose()?,
            webhook_metadata: serde_json::from_str(&r.webhook_metadata)?,
            created_at: from_millis(r.created_at)?,
            updated_at: from_millis(r.updated_at)?,
            id: r.id,
            meta_msg_id: r.meta_msg_id,
            wa_id: r.wa_id,
            phone_number: r.phone_number,
            contact_name: r.contact_name,
            message_body: r.message_body,
            message_url: r.message_url,
        })
    }
}

/// A row that fails to decode is a storage fault, not bad caller input.
pub(crate) fn decode_message(row: MessageRow) -> Result<CanonicalMessage> {
    CanonicalMessage::try_from(row).map_err(|e| Error::storage("decode message row", e))
}

pub(crate) fn decode_messages(rows: Vec<MessageRow>) -> Result<Vec<CanonicalMessage>> {
    rows.into_iter().map(decode_message).collect()
}

#[derive(sqlx::FromRow)]
pub(crate) struct ConversationRow {
    wa_id: String,
    phone_number: String,
    contact_name: String,
    last_message_time: i64,
    last_message_preview: String,
    last_message_type: String,
    unread_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<ConversationRow> for ConversationSummary {
    type Error = Error;

    fn try_from(r: ConversationRow) -> Result<Self> {
        Ok(Self {
            last_message_time: from_millis(r.last_message_time)?,
            last_message_type: r.last_message_type.parse()?,
            unread_count: u32::try_from(r.unread_count.max(0)).unwrap_or(u32::MAX),
            created_at: from_millis(r.created_at)?,
            updated_at: from_millis(r.updated_at)?,
            wa_id: r.wa_id,
            phone_number: r.phone_number,
            contact_name: r.contact_name,
            last_message_preview: r.last_message_preview,
        })
    }
}

pub(crate) fn decode_summary(row: ConversationRow) -> Result<ConversationSummary> {
    ConversationSummary::try_from(row).map_err(|e| Error::storage("decode conversation row", e))
}
