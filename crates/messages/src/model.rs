//! Canonical message and conversation records.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Generates `as_str`, `Display` and `FromStr` for a lowercase string enum.
macro_rules! string_enum {
    ($name:ident, $what:literal { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(Error::validation(format!(
                        "unknown {}: '{other}'",
                        $what
                    ))),
                }
            }
        }
    };
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

string_enum!(Direction, "direction" {
    Inbound => "inbound",
    Outbound => "outbound",
});

/// Content kind of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Document,
    Audio,
    Video,
    Location,
    Contact,
}

string_enum!(MessageType, "message type" {
    Text => "text",
    Image => "image",
    Document => "document",
    Audio => "audio",
    Video => "video",
    Location => "location",
    Contact => "contact" | "contacts",
});

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

string_enum!(MessageStatus, "message status" {
    Sent => "sent",
    Delivered => "delivered",
    Read => "read",
    Failed => "failed",
});

/// The storage-ready form of one conversational message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Primary identifier.
    pub id: String,
    /// Correlation identifier carried by carrier status callbacks.
    pub meta_msg_id: Option<String>,
    /// Conversation identifier (the remote party's WhatsApp id).
    pub wa_id: String,
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub message_body: String,
    pub message_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub status_updated_at: Option<DateTime<Utc>>,
    /// Opaque origin metadata, stored and returned untouched.
    #[serde(default)]
    pub webhook_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalMessage {
    /// Whether `identifier` names this record through either key.
    pub fn matches(&self, identifier: &str) -> bool {
        self.id == identifier || self.meta_msg_id.as_deref() == Some(identifier)
    }
}

/// Denormalized rollup of a conversation's latest activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub wa_id: String,
    pub phone_number: String,
    pub contact_name: String,
    pub last_message_time: DateTime<Utc>,
    pub last_message_preview: String,
    pub last_message_type: MessageType,
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enums_case_insensitively() {
        assert_eq!("READ".parse::<MessageStatus>().unwrap(), MessageStatus::Read);
        assert_eq!(" inbound ".parse::<Direction>().unwrap(), Direction::Inbound);
        assert_eq!("contacts".parse::<MessageType>().unwrap(), MessageType::Contact);
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "sticker".parse::<MessageType>().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("sticker"));
        assert!("seen".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_value(MessageStatus::Delivered).unwrap();
        assert_eq!(json, "delivered");
        assert_eq!(MessageType::Document.to_string(), "document");
    }
}
