use std::sync::atomic::{AtomicU64, Ordering};

use {
    dashmap::DashMap,
    inbox_messages::{CanonicalMessage, Error, MessageBroadcaster, Result},
    inbox_protocol::{EventFrame, events},
    tokio::sync::mpsc::error::TrySendError,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use inbox_metrics::{broadcast as broadcast_metrics, counter};

use crate::state::ConnectedClient;

// ── Registry ─────────────────────────────────────────────────────────────────

/// Connected WebSocket clients and the fan-out of events to them.
///
/// Every client owns a bounded outbox drained by its write loop. Sending
/// never waits: a full outbox drops the frame for that client only.
#[derive(Default)]
pub struct WsBroadcaster {
    clients: DashMap<String, ConnectedClient>,
    seq: AtomicU64,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn register(&self, client: ConnectedClient) {
        self.clients.insert(client.conn_id.clone(), client);
    }

    pub fn remove(&self, conn_id: &str) -> Option<ConnectedClient> {
        self.clients.remove(conn_id).map(|(_, client)| client)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Record that `conn_id` joined a conversation channel. Returns `false`
    /// for an unknown connection.
    pub fn join(&self, conn_id: &str, wa_id: &str) -> bool {
        match self.clients.get_mut(conn_id) {
            Some(mut client) => {
                client.conversations.insert(wa_id.to_string());
                true
            },
            None => false,
        }
    }

    pub fn leave(&self, conn_id: &str, wa_id: &str) -> bool {
        match self.clients.get_mut(conn_id) {
            Some(mut client) => {
                client.conversations.remove(wa_id);
                true
            },
            None => false,
        }
    }

    /// Conversation channels `conn_id` has joined, sorted.
    pub fn joined(&self, conn_id: &str) -> Vec<String> {
        let mut joined: Vec<String> = self
            .clients
            .get(conn_id)
            .map(|c| c.conversations.iter().cloned().collect())
            .unwrap_or_default();
        joined.sort();
        joined
    }

    /// Send one frame to a single client.
    pub fn send_to(&self, conn_id: &str, frame: &str) -> bool {
        self.clients
            .get(conn_id)
            .is_some_and(|client| client.sender.try_send(frame.to_string()).is_ok())
    }

    /// Send an event to every client except `except`. Returns how many
    /// outboxes accepted the frame.
    pub fn broadcast(
        &self,
        event: &str,
        payload: serde_json::Value,
        except: Option<&str>,
    ) -> Result<usize> {
        let seq = self.next_seq();
        let frame = EventFrame::new(event, payload, seq);
        let json = serde_json::to_string(&frame).map_err(Error::broadcast)?;

        let mut delivered = 0;
        for client in self.clients.iter() {
            if except == Some(client.conn_id.as_str()) {
                continue;
            }
            match client.sender.try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %client.conn_id, event, seq, "client outbox full, dropping event");
                    #[cfg(feature = "metrics")]
                    counter!(broadcast_metrics::LAGGED_TOTAL).increment(1);
                },
                // The connection is tearing down; its handler removes it.
                Err(TrySendError::Closed(_)) => {},
            }
        }

        debug!(event, seq, clients = self.clients.len(), delivered, "broadcast event");
        #[cfg(feature = "metrics")]
        counter!(broadcast_metrics::PUBLISHED_TOTAL).increment(1);
        Ok(delivered)
    }
}

impl MessageBroadcaster for WsBroadcaster {
    fn publish(&self, message: &CanonicalMessage) -> Result<usize> {
        let payload = serde_json::to_value(message).map_err(Error::broadcast)?;
        self.broadcast(events::MESSAGE_UPSERT, payload, None)
    }
}
