//! Fan-out of one participant's message to the rest of its session.
//!
//! Delivery is at-most-once: each recipient gets the text queued on its
//! handle without waiting, and a recipient that is gone or too far behind
//! simply misses the message. Messages from one sender reach each recipient
//! in send order because the sender relays from a single task into FIFO
//! queues.

use std::sync::Arc;

use super::handle::{ConnectionHandle, DeliveryError};
use super::registry::ConnectionRegistry;

/// Separator placed between the sender's name and the message body.
pub const NAME_SEPARATOR: &str = "::  ";

/// Outcome of one broadcast, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Prefix `message` with the sender's display name.
pub fn format_message(name: &str, message: &str) -> String {
    format!("{name}{NAME_SEPARATOR}{message}")
}

/// Deliver `message` from `sender` to every other handle currently
/// registered for `session_id`.
pub fn broadcast(
    registry: &ConnectionRegistry,
    session_id: &str,
    sender: &ConnectionHandle,
    message: &str,
) -> RelayReport {
    let text: Arc<str> = format_message(sender.name(), message).into();
    let mut report = RelayReport::default();

    for recipient in registry.snapshot(session_id) {
        if recipient.id() == sender.id() {
            continue;
        }
        match recipient.deliver(Arc::clone(&text)) {
            Ok(()) => report.delivered += 1,
            Err(DeliveryError::Full) => {
                report.dropped += 1;
                tracing::warn!(
                    session_id,
                    handle_id = recipient.id(),
                    "recipient lagging, message dropped"
                );
            }
            Err(DeliveryError::Closed) => {
                report.dropped += 1;
                tracing::debug!(
                    session_id,
                    handle_id = recipient.id(),
                    "recipient already closed"
                );
            }
        }
    }

    report
}
