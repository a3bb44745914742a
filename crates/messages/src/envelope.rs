//! Wire shapes of inbound webhook deliveries.
//!
//! Only the skeleton down to the per-item lists is typed strictly. Items stay
//! raw [`Value`]s until the normalizer parses them one at a time, so a single
//! bad item can be skipped without losing its siblings.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Deserializer, de},
    serde_json::Value,
};

/// Accepted top-level envelope shapes.
///
/// Variants are tried in declaration order, which is the precedence: an
/// envelope carrying both `metaData.entry` and `entry` resolves to the
/// wrapped shape. New shapes are added as new variants.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeShape {
    /// `{ "metaData": { "entry": [...] } }`, as relayed by BSP gateways.
    Wrapped {
        #[serde(rename = "metaData")]
        meta_data: EntryList,
    },
    /// `{ "entry": [...] }`, as sent by the Cloud API directly.
    Direct { entry: Vec<Value> },
}

impl EnvelopeShape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wrapped { .. } => "wrapped",
            Self::Direct { .. } => "direct",
        }
    }

    pub fn into_entries(self) -> Vec<Value> {
        match self {
            Self::Wrapped { meta_data } => meta_data.entry,
            Self::Direct { entry } => entry,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryList {
    pub entry: Vec<Value>,
}

/// Envelope-level fields copied into every event's origin metadata.
#[derive(Debug, Default, Deserialize)]
pub struct EnvelopeContext {
    #[serde(default)]
    pub payload_type: Option<Value>,
    #[serde(default)]
    pub gs_app_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<ChangeValue>,
}

/// The payload of one change. Each part stays raw so a malformed part is
/// dropped on its own; see [`ChangeValue::list`].
#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub contacts: Value,
    #[serde(default)]
    pub messages: Value,
    #[serde(default)]
    pub statuses: Value,
}

impl ChangeValue {
    /// Items of a list field. Absent or `null` is an empty list; any other
    /// non-array is an error naming the field.
    pub fn list(field: &'static str, raw: Value) -> Result<Vec<Value>, String> {
        match raw {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(format!("`{field}` must be an array, got {}", json_kind(&other))),
        }
    }

    /// Change-level metadata, or `None` when absent or not an object.
    pub fn metadata(&self) -> Option<ChangeMetadata> {
        ChangeMetadata::deserialize(&self.metadata).ok()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub name: Option<String>,
}

/// One item of `value.messages[]`.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub from: String,
    pub id: String,
    #[serde(deserialize_with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Everything else, including the typed content object (`text`,
    /// `image`, `document`, ...).
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// One item of `value.statuses[]`.
#[derive(Debug, Deserialize)]
pub struct RawStatus {
    pub id: String,
    pub status: String,
    pub recipient_id: String,
    #[serde(deserialize_with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta_msg_id: Option<String>,
    #[serde(default)]
    pub conversation: Option<RawConversation>,
    #[serde(default)]
    pub pricing: Option<Value>,
    #[serde(default)]
    pub gs_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub origin: Option<RawOrigin>,
    #[serde(default)]
    pub expiration_timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RawOrigin {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Accepts epoch seconds as either a JSON string or a JSON integer.
fn epoch_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let secs = match &raw {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{s}': {e}")))?,
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp {n}")))?,
        other => {
            return Err(de::Error::custom(format!(
                "timestamp must be epoch seconds, got {other}"
            )));
        },
    };
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn wrapped_shape_wins_when_both_present() {
        let shape: EnvelopeShape = serde_json::from_value(json!({
            "metaData": { "entry": [{ "id": "wrapped" }] },
            "entry": [{ "id": "direct" }, { "id": "direct-2" }],
        }))
        .unwrap();
        assert_eq!(shape.name(), "wrapped");
        assert_eq!(shape.into_entries().len(), 1);
    }

    #[test]
    fn falls_back_to_direct_when_container_has_no_entries() {
        let shape: EnvelopeShape = serde_json::from_value(json!({
            "metaData": { "object": "whatsapp_business_account" },
            "entry": [],
        }))
        .unwrap();
        assert_eq!(shape.name(), "direct");
    }

    #[test]
    fn neither_shape_is_an_error() {
        assert!(serde_json::from_value::<EnvelopeShape>(json!({ "object": "x" })).is_err());
    }

    #[test]
    fn list_fields_accept_arrays_and_null_only() {
        assert_eq!(ChangeValue::list("messages", json!([1, 2])).unwrap().len(), 2);
        assert!(ChangeValue::list("messages", Value::Null).unwrap().is_empty());
        let err = ChangeValue::list("statuses", json!({ "id": "x" })).unwrap_err();
        assert_eq!(err, "`statuses` must be an array, got an object");
    }

    #[test]
    fn timestamp_accepts_string_and_number() {
        let from_string: RawMessage = serde_json::from_value(json!({
            "from": "1", "id": "a", "timestamp": "1000"
        }))
        .unwrap();
        let from_number: RawMessage = serde_json::from_value(json!({
            "from": "1", "id": "a", "timestamp": 1000
        }))
        .unwrap();
        assert_eq!(from_string.timestamp, from_number.timestamp);
        assert_eq!(from_string.timestamp.timestamp(), 1000);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        let err = serde_json::from_value::<RawMessage>(json!({
            "from": "1", "id": "a", "timestamp": "yesterday"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }
}
