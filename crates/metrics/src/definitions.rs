//! Metric name and label definitions.
//!
//! All metric names used by the inbox crates live here so the exported set is
//! documented in one place.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "inbox_http_requests_total";
    /// Duration of HTTP requests in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "inbox_http_request_duration_seconds";
}

/// Webhook delivery metrics
pub mod webhook {
    /// Webhook deliveries received (labelled by result)
    pub const DELIVERIES_TOTAL: &str = "inbox_webhook_deliveries_total";
    /// Message and status events extracted from deliveries
    pub const EVENTS_TOTAL: &str = "inbox_webhook_events_total";
    /// Items dropped as malformed
    pub const ITEMS_SKIPPED_TOTAL: &str = "inbox_webhook_items_skipped_total";
    /// Signature or verify-token rejections
    pub const REJECTED_TOTAL: &str = "inbox_webhook_rejected_total";
    /// Time to process one delivery in seconds
    pub const PROCESSING_DURATION_SECONDS: &str = "inbox_webhook_processing_duration_seconds";
}

/// Canonical message store metrics
pub mod messages {
    /// Records inserted
    pub const CREATED_TOTAL: &str = "inbox_messages_created_total";
    /// Records merged into an existing one
    pub const UPDATED_TOTAL: &str = "inbox_messages_updated_total";
    /// Outbound messages recorded through the API
    pub const SENT_TOTAL: &str = "inbox_messages_sent_total";
}

/// Live update fan-out metrics
pub mod broadcast {
    /// Updates fanned out to connected subscribers
    pub const PUBLISHED_TOTAL: &str = "inbox_broadcast_published_total";
    /// Updates dropped for a lagging subscriber
    pub const LAGGED_TOTAL: &str = "inbox_broadcast_lagged_total";
}

/// WebSocket metrics
pub mod websocket {
    /// Total number of WebSocket connections established
    pub const CONNECTIONS_TOTAL: &str = "inbox_websocket_connections_total";
    /// Number of currently active WebSocket connections
    pub const CONNECTIONS_ACTIVE: &str = "inbox_websocket_connections_active";
    /// Total number of WebSocket frames received
    pub const MESSAGES_RECEIVED_TOTAL: &str = "inbox_websocket_messages_received_total";
}

/// Common label keys used across metrics
pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const RESULT: &str = "result";
    pub const REASON: &str = "reason";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// HTTP request duration buckets (in seconds)
    /// Covers 1ms to 60s
    pub static HTTP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Webhook processing buckets (in seconds)
    /// Batches are small and local, so the range tops out at 10s
    pub static WEBHOOK_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 10.0,
        ]
    });
}
