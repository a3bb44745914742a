//! Dual-key create-or-merge rules.
//!
//! Stores call [`plan_upsert`] inside their own atomic section with every
//! record whose `id` or `meta_msg_id` equals either incoming identifier, then
//! execute the returned [`UpsertPlan`]. Keeping the decision here means every
//! store merges identically.

use {
    chrono::{DateTime, Utc},
    serde_json::{Map, Value},
};

use crate::{
    model::{CanonicalMessage, Direction, MessageStatus, MessageType},
    normalize::{Event, MessageEvent, StatusEvent},
};

/// Incoming message fields. `None` means "not carried by this event" and
/// leaves the stored value untouched on merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub id: String,
    pub meta_msg_id: Option<String>,
    pub wa_id: String,
    pub contact_name: Option<String>,
    pub direction: Option<Direction>,
    pub message_type: Option<MessageType>,
    pub message_body: Option<String>,
    pub message_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<MessageStatus>,
    pub status_updated_at: Option<DateTime<Utc>>,
    /// Merged key by key into the stored origin metadata.
    pub metadata: Map<String, Value>,
}

impl MessagePatch {
    /// The distinct identifiers this patch can match on, primary first.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        if let Some(alt) = self.meta_msg_id.as_deref()
            && alt != self.id
        {
            ids.push(alt);
        }
        ids
    }

    /// Whether the patch carries message content, as opposed to only a
    /// status change.
    pub fn has_content(&self) -> bool {
        self.message_body.is_some() || self.message_type.is_some()
    }
}

impl From<MessageEvent> for MessagePatch {
    fn from(m: MessageEvent) -> Self {
        Self {
            meta_msg_id: Some(m.id.clone()),
            id: m.id,
            wa_id: m.from,
            contact_name: Some(m.contact_name),
            direction: Some(Direction::Inbound),
            message_type: Some(m.message_type),
            message_body: Some(m.body),
            message_url: m.media_url,
            timestamp: Some(m.timestamp),
            status: Some(MessageStatus::Delivered),
            status_updated_at: None,
            metadata: m.metadata,
        }
    }
}

impl From<StatusEvent> for MessagePatch {
    fn from(s: StatusEvent) -> Self {
        Self {
            meta_msg_id: s.meta_msg_id.or_else(|| Some(s.id.clone())),
            id: s.id,
            wa_id: s.recipient_id,
            status: Some(s.status),
            status_updated_at: Some(s.timestamp),
            metadata: s.metadata,
            ..Default::default()
        }
    }
}

impl From<Event> for MessagePatch {
    fn from(event: Event) -> Self {
        match event {
            Event::Message(m) => m.into(),
            Event::Status(s) => s.into(),
        }
    }
}

/// What a store must write.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertPlan {
    /// No record matched; insert this one.
    Insert(CanonicalMessage),
    /// Overwrite the stored record whose primary id is `message.id`.
    Update(CanonicalMessage),
}

impl UpsertPlan {
    pub fn message(&self) -> &CanonicalMessage {
        match self {
            Self::Insert(m) | Self::Update(m) => m,
        }
    }

    pub fn into_upserted(self) -> Upserted {
        match self {
            Self::Insert(message) => Upserted {
                message,
                created: true,
            },
            Self::Update(message) => Upserted {
                message,
                created: false,
            },
        }
    }
}

/// Result of one upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub message: CanonicalMessage,
    pub created: bool,
}

/// Pick the record a patch refers to.
///
/// A record whose primary id equals an incoming identifier wins over one
/// matched only through its alternate id.
pub fn select_target<'a>(
    patch: &MessagePatch,
    candidates: &'a [CanonicalMessage],
) -> Option<&'a CanonicalMessage> {
    let ids = patch.identifiers();
    ids.iter()
        .find_map(|id| candidates.iter().find(|c| c.id == *id))
        .or_else(|| {
            ids.iter().find_map(|id| {
                candidates
                    .iter()
                    .find(|c| c.meta_msg_id.as_deref() == Some(*id))
            })
        })
}

/// Decide between insert and merge given the records matching either
/// identifier of `patch`.
pub fn plan_upsert(
    patch: MessagePatch,
    candidates: &[CanonicalMessage],
    now: DateTime<Utc>,
) -> UpsertPlan {
    let Some(target) = select_target(&patch, candidates) else {
        return UpsertPlan::Insert(new_record(patch, now));
    };

    // An identifier already owned by another record cannot be backfilled
    // without breaking column uniqueness.
    let backfill = if target.meta_msg_id.is_none() {
        patch
            .identifiers()
            .into_iter()
            .find(|id| {
                *id != target.id
                    && !candidates
                        .iter()
                        .any(|c| c.id != target.id && c.matches(id))
            })
            .map(str::to_string)
    } else {
        None
    };

    let mut merged = merge(target.clone(), patch, now);
    if merged.meta_msg_id.is_none() {
        merged.meta_msg_id = backfill;
    }
    UpsertPlan::Update(merged)
}

/// Overlay the present fields of `patch` onto `existing`. Identifiers and the
/// conversation of a stored record never change.
pub fn merge(mut existing: CanonicalMessage, patch: MessagePatch, now: DateTime<Utc>) -> CanonicalMessage {
    if let Some(name) = patch.contact_name {
        existing.contact_name = Some(name);
    }
    if let Some(direction) = patch.direction {
        existing.direction = direction;
    }
    if let Some(kind) = patch.message_type {
        existing.message_type = kind;
    }
    if let Some(body) = patch.message_body {
        existing.message_body = body;
    }
    if let Some(url) = patch.message_url {
        existing.message_url = Some(url);
    }
    if let Some(ts) = patch.timestamp {
        existing.timestamp = ts;
    }
    if let Some(status) = patch.status {
        existing.status = status;
    }
    if let Some(at) = patch.status_updated_at {
        existing.status_updated_at = Some(at);
    }
    existing.webhook_metadata = merge_metadata(existing.webhook_metadata, patch.metadata);
    existing.updated_at = now;
    existing
}

fn new_record(patch: MessagePatch, now: DateTime<Utc>) -> CanonicalMessage {
    let timestamp = patch
        .timestamp
        .or(patch.status_updated_at)
        .unwrap_or(now);
    CanonicalMessage {
        phone_number: patch.wa_id.clone(),
        id: patch.id,
        meta_msg_id: patch.meta_msg_id,
        wa_id: patch.wa_id,
        contact_name: patch.contact_name,
        // Status callbacks only arrive for messages we sent.
        direction: patch.direction.unwrap_or(Direction::Outbound),
        message_type: patch.message_type.unwrap_or_default(),
        message_body: patch.message_body.unwrap_or_default(),
        message_url: patch.message_url,
        timestamp,
        status: patch.status.unwrap_or_default(),
        status_updated_at: patch.status_updated_at,
        webhook_metadata: Value::Object(patch.metadata),
        created_at: now,
        updated_at: now,
    }
}

fn merge_metadata(existing: Value, incoming: Map<String, Value>) -> Value {
    if incoming.is_empty() {
        return existing;
    }
    let mut merged = match existing {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.extend(incoming);
    Value::Object(merged)
}
