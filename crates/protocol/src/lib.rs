//! Real-time WebSocket protocol definitions.
//!
//! All communication uses JSON text frames over `/ws`.
//!
//! Frame types:
//! - `RequestFrame`: client → gateway call (`conversation.join`, ...)
//! - `ResponseFrame`: gateway → client result for one request
//! - `EventFrame`: gateway → client server-push (`message.upsert`, ...)

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB
/// Per-connection outbound buffer, in frames. A subscriber further behind
/// than this skips ahead and loses the oldest updates.
pub const BROADCAST_CAPACITY: usize = 1_024;

// ── Names ────────────────────────────────────────────────────────────────────

pub mod events {
    /// Sent once per connection right after upgrade.
    pub const HELLO: &str = "hello";
    /// A canonical message was created or changed. Payload is the record.
    pub const MESSAGE_UPSERT: &str = "message.upsert";
    /// Another client reported typing activity.
    pub const TYPING: &str = "typing";

    pub const ALL: &[&str] = &[HELLO, MESSAGE_UPSERT, TYPING];
}

pub mod methods {
    pub const CONVERSATION_JOIN: &str = "conversation.join";
    pub const CONVERSATION_LEAVE: &str = "conversation.leave";
    pub const TYPING: &str = "typing";

    pub const ALL: &[&str] = &[CONVERSATION_JOIN, CONVERSATION_LEAVE, TYPING];
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → gateway request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Gateway → client response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Gateway → client server-push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Payload of the `hello` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub protocol: u32,
    pub version: String,
    #[serde(rename = "connId")]
    pub conn_id: String,
    pub features: Features,
    #[serde(rename = "maxPayload")]
    pub max_payload: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

impl Features {
    pub fn current() -> Self {
        Self {
            methods: methods::ALL.iter().map(|m| (*m).to_string()).collect(),
            events: events::ALL.iter().map(|e| (*e).to_string()).collect(),
        }
    }
}

/// Params of `conversation.join` / `conversation.leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationParams {
    pub wa_id: String,
}

/// Params of `typing`, echoed to other subscribers as the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingParams {
    pub wa_id: String,
    #[serde(rename = "isTyping", default = "default_true")]
    pub is_typing: bool,
}

fn default_true() -> bool {
    true
}
