//! Gateway: HTTP + WebSocket server in front of the inbox.
//!
//! Lifecycle:
//! 1. Open the database and run migrations
//! 2. Wire the SQLite stores and the WebSocket broadcaster into an `Inbox`
//! 3. Install the metrics recorder (when enabled)
//! 4. Serve the webhook, REST, health and `/ws` routes
//!
//! Ingestion rules live in `inbox-messages`; handlers here only translate
//! HTTP and WebSocket traffic into `Inbox` calls.

pub mod api;
pub mod broadcast;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics_middleware;
#[cfg(feature = "metrics")]
pub mod metrics_routes;
pub mod server;
pub mod state;
pub mod webhook;
pub mod ws;

pub use {
    broadcast::WsBroadcaster,
    error::ApiError,
    server::{AppState, build_gateway_app, build_state, inbox_options, sqlite_inbox, start_gateway},
    state::GatewayState,
};
