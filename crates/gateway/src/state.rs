use std::{collections::HashSet, sync::Arc, time::Instant};

use {
    inbox_config::{Environment, InboxConfig, WebhookConfig},
    inbox_messages::Inbox,
    tokio::sync::mpsc,
};

#[cfg(feature = "metrics")]
use inbox_metrics::MetricsHandle;

use crate::broadcast::WsBroadcaster;

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client currently connected to the gateway.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub remote_ip: String,
    /// Bounded outbox drained by this client's write loop.
    pub sender: mpsc::Sender<String>,
    /// Conversation channels joined through `conversation.join`.
    pub conversations: HashSet<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    pub fn new(
        conn_id: impl Into<String>,
        remote_ip: impl Into<String>,
        sender: mpsc::Sender<String>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            remote_ip: remote_ip.into(),
            sender,
            conversations: HashSet::new(),
            connected_at: Instant::now(),
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared state for every HTTP handler and WebSocket connection.
pub struct GatewayState {
    pub inbox: Arc<Inbox>,
    /// Also installed as the inbox's broadcaster.
    pub broadcaster: Arc<WsBroadcaster>,
    pub webhook: WebhookConfig,
    pub environment: Environment,
    /// Error responses carry internal detail.
    expose_error_detail: bool,
    /// Allowed CORS origins; empty allows any.
    pub cors_origins: Vec<String>,
    pub version: String,
    pub started_at: Instant,
    #[cfg(feature = "metrics")]
    pub metrics_handle: MetricsHandle,
}

impl GatewayState {
    pub fn new(inbox: Arc<Inbox>, broadcaster: Arc<WsBroadcaster>, config: &InboxConfig) -> Self {
        Self {
            inbox,
            broadcaster,
            webhook: config.webhook.clone(),
            environment: config.server.environment,
            expose_error_detail: config.server.is_development(),
            cors_origins: config.server.cors_origins.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            #[cfg(feature = "metrics")]
            metrics_handle: MetricsHandle::disabled(),
        }
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = handle;
        self
    }

    pub fn is_development(&self) -> bool {
        self.expose_error_detail
    }
}
