//! Fan-out of message changes to live subscribers.

use crate::{Result, model::CanonicalMessage};

/// Publishes change notifications to connected subscribers.
///
/// `publish` must not block and must not wait on subscribers. Delivery is
/// at-most-once; errors are reported so the caller can log them, never so it
/// can retry.
pub trait MessageBroadcaster: Send + Sync {
    /// Send the full updated record to every subscriber. Returns the number
    /// of subscribers the notification was handed to.
    fn publish(&self, message: &CanonicalMessage) -> Result<usize>;
}

/// Broadcaster used when nobody listens (offline replay, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl MessageBroadcaster for NoopBroadcaster {
    fn publish(&self, _message: &CanonicalMessage) -> Result<usize> {
        Ok(0)
    }
}
