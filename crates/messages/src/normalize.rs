//! Webhook envelope → canonical [`Event`] values.
//!
//! Walks `entry[] → changes[] → value.{messages,statuses}[]` in input order.
//! Items that fail to parse are skipped and reported in
//! [`Normalized::skipped`]; they never abort the batch.

use std::collections::HashMap;

use {
    chrono::{DateTime, Utc},
    serde::Deserialize,
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::{
    Error, Result,
    envelope::{
        Change, ChangeValue, Contact, Entry, EnvelopeContext, EnvelopeShape, RawMessage, RawStatus,
    },
    model::{MessageStatus, MessageType},
};

/// Where a message field may be read from.
#[derive(Debug, Clone, Copy)]
enum FieldSource {
    /// A fixed path from the message root.
    Path(&'static [&'static str]),
    /// A field of the content object named by the message's `type`
    /// (e.g. `image.caption` for an image message).
    Typed(&'static str),
}

/// Body sources in priority order: text body, then caption, then media link.
const BODY_SOURCES: &[FieldSource] = &[
    FieldSource::Path(&["text", "body"]),
    FieldSource::Typed("caption"),
    FieldSource::Path(&["caption"]),
    FieldSource::Typed("link"),
];

/// Media reference sources in priority order.
const MEDIA_SOURCES: &[FieldSource] = &[FieldSource::Typed("link"), FieldSource::Typed("url")];

/// A new or re-delivered conversational message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub id: String,
    pub from: String,
    pub contact_name: String,
    pub message_type: MessageType,
    pub body: String,
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// A delivery-status change for a previously sent or received message.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub id: String,
    pub meta_msg_id: Option<String>,
    pub status: MessageStatus,
    pub recipient_id: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(MessageEvent),
    Status(StatusEvent),
}

impl Event {
    pub fn id(&self) -> &str {
        match self {
            Self::Message(m) => &m.id,
            Self::Status(s) => &s.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Status(_) => "status",
        }
    }
}

/// An item dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedItem {
    /// Position in the envelope, e.g. `entry[0].changes[1].messages[2]`.
    pub location: String,
    pub reason: String,
}

/// Output of one normalization pass.
#[derive(Debug, Default)]
pub struct Normalized {
    /// Matched envelope shape, or `None` when neither shape was present.
    pub shape: Option<&'static str>,
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedItem>,
}

impl Normalized {
    fn skip(&mut self, location: String, reason: impl std::fmt::Display) {
        let reason = reason.to_string();
        warn!(%location, %reason, "skipping malformed webhook item");
        #[cfg(feature = "metrics")]
        inbox_metrics::counter!(inbox_metrics::webhook::ITEMS_SKIPPED_TOTAL).increment(1);
        self.skipped.push(SkippedItem { location, reason });
    }
}

/// Parse raw request bytes. Fails only when the body is not a JSON object.
pub fn normalize_bytes(body: &[u8]) -> Result<Normalized> {
    let envelope: Value = serde_json::from_slice(body)?;
    normalize(&envelope)
}

/// Normalize an already-parsed envelope.
pub fn normalize(envelope: &Value) -> Result<Normalized> {
    if !envelope.is_object() {
        return Err(Error::malformed("webhook envelope must be a JSON object"));
    }

    let mut out = Normalized::default();

    let shape = match EnvelopeShape::deserialize(envelope) {
        Ok(shape) => shape,
        Err(_) => {
            warn!("webhook envelope matches no known shape, nothing to process");
            return Ok(out);
        },
    };
    out.shape = Some(shape.name());

    let context = EnvelopeContext::deserialize(envelope).unwrap_or_default();
    let mut base = Map::new();
    insert_present(&mut base, "payload_type", context.payload_type);
    insert_present(&mut base, "gs_app_id", context.gs_app_id);

    for (ei, entry) in shape.into_entries().into_iter().enumerate() {
        let entry: Entry = match serde_json::from_value(entry) {
            Ok(e) => e,
            Err(e) => {
                out.skip(format!("entry[{ei}]"), e);
                continue;
            },
        };
        for (ci, change) in entry.changes.into_iter().enumerate() {
            let location = format!("entry[{ei}].changes[{ci}]");
            let change: Change = match serde_json::from_value(change) {
                Ok(c) => c,
                Err(e) => {
                    out.skip(location, e);
                    continue;
                },
            };
            let Some(value) = change.value else {
                debug!(%location, field = ?change.field, "change has no value");
                continue;
            };
            normalize_change(&mut out, &location, &base, value);
        }
    }

    debug!(
        shape = out.shape,
        events = out.events.len(),
        skipped = out.skipped.len(),
        "normalized webhook envelope"
    );
    Ok(out)
}

fn normalize_change(out: &mut Normalized, location: &str, base: &Map<String, Value>, value: ChangeValue) {
    let mut message_meta = base.clone();
    if let Some(metadata) = value.metadata() {
        insert_present(
            &mut message_meta,
            "phone_number_id",
            metadata.phone_number_id.map(Value::String),
        );
        insert_present(
            &mut message_meta,
            "display_phone_number",
            metadata.display_phone_number.map(Value::String),
        );
    }

    let ChangeValue {
        contacts,
        messages,
        statuses,
        ..
    } = value;
    let mut list = |field: &'static str, raw: Value| {
        ChangeValue::list(field, raw).unwrap_or_else(|reason| {
            out.skip(format!("{location}.{field}"), reason);
            Vec::new()
        })
    };
    let contacts = contact_names(&list("contacts", contacts));
    let messages = list("messages", messages);
    let statuses = list("statuses", statuses);

    for (mi, item) in messages.into_iter().enumerate() {
        let location = format!("{location}.messages[{mi}]");
        match parse_message(item, &contacts, &message_meta) {
            Ok(event) => out.events.push(Event::Message(event)),
            Err(e) => out.skip(location, e),
        }
    }

    for (si, item) in statuses.into_iter().enumerate() {
        let location = format!("{location}.statuses[{si}]");
        match parse_status(item, base) {
            Ok(event) => out.events.push(Event::Status(event)),
            Err(e) => out.skip(location, e),
        }
    }
}

/// `wa_id → profile.name` for every well-formed contact that has a name.
fn contact_names(contacts: &[Value]) -> HashMap<String, String> {
    contacts
        .iter()
        .filter_map(|c| Contact::deserialize(c).ok())
        .filter_map(|c| {
            let name = c.profile?.name?;
            (!name.trim().is_empty()).then_some((c.wa_id, name))
        })
        .collect()
}

fn parse_message(
    item: Value,
    contacts: &HashMap<String, String>,
    metadata: &Map<String, Value>,
) -> Result<MessageEvent> {
    let raw: RawMessage = serde_json::from_value(item)?;
    require_non_empty("from", &raw.from)?;
    require_non_empty("id", &raw.id)?;

    let kind = raw.kind.as_deref().unwrap_or("text");
    let message_type: MessageType = kind.parse().map_err(|_| {
        Error::malformed(format!("unsupported message type '{kind}'"))
    })?;

    let body = resolve(&raw.fields, kind, BODY_SOURCES).unwrap_or_default();
    let media_url = resolve(&raw.fields, kind, MEDIA_SOURCES);
    let contact_name = contacts
        .get(&raw.from)
        .cloned()
        .unwrap_or_else(|| raw.from.clone());

    Ok(MessageEvent {
        id: raw.id,
        from: raw.from,
        contact_name,
        message_type,
        body,
        media_url,
        timestamp: raw.timestamp,
        metadata: metadata.clone(),
    })
}

fn parse_status(item: Value, base: &Map<String, Value>) -> Result<StatusEvent> {
    let raw: RawStatus = serde_json::from_value(item)?;
    require_non_empty("id", &raw.id)?;
    require_non_empty("recipient_id", &raw.recipient_id)?;
    let status: MessageStatus = raw
        .status
        .parse()
        .map_err(|_| Error::malformed(format!("unsupported status '{}'", raw.status)))?;

    let mut metadata = base.clone();
    if let Some(conversation) = raw.conversation {
        insert_present(
            &mut metadata,
            "conversation_id",
            conversation.id.map(Value::String),
        );
        insert_present(
            &mut metadata,
            "conversation_origin",
            conversation
                .origin
                .and_then(|o| o.kind)
                .map(Value::String),
        );
        insert_present(
            &mut metadata,
            "conversation_expiration",
            conversation.expiration_timestamp,
        );
    }
    insert_present(&mut metadata, "pricing", raw.pricing);
    insert_present(&mut metadata, "gs_id", raw.gs_id);

    Ok(StatusEvent {
        id: raw.id,
        meta_msg_id: raw.meta_msg_id.filter(|m| !m.trim().is_empty()),
        status,
        recipient_id: raw.recipient_id,
        timestamp: raw.timestamp,
        metadata,
    })
}

fn resolve(fields: &Map<String, Value>, kind: &str, sources: &[FieldSource]) -> Option<String> {
    sources.iter().find_map(|source| {
        let value = match source {
            FieldSource::Path(path) => {
                let (first, rest) = path.split_first()?;
                rest.iter()
                    .try_fold(fields.get(*first)?, |v, key| v.get(key))?
            },
            FieldSource::Typed(field) => fields.get(kind)?.get(field)?,
        };
        value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::malformed(format!("missing {field}")));
    }
    Ok(())
}

fn insert_present(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(v) = value
        && !v.is_null()
    {
        map.insert(key.to_string(), v);
    }
}
