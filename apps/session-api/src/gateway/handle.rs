//! Per-connection handle stored in the connection registry.

use std::sync::Arc;

use huddle_common::id::{prefix, prefixed_ulid};
use tokio::sync::{mpsc, watch};

/// Why a queued delivery could not be made. The relay swallows both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient connection is gone")]
    Closed,
    #[error("recipient outbound queue is full")]
    Full,
}

/// One admitted, live connection: a unique id, the display name it joined
/// with, and the capability to queue text for it.
///
/// Cloning is cheap; clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Arc<str>,
    name: Arc<str>,
    outbound: mpsc::Sender<Arc<str>>,
    close: Arc<watch::Sender<Option<&'static str>>>,
}

/// Receiving side of a [`ConnectionHandle`], drained by the task that owns the
/// socket.
pub struct Mailbox {
    pub messages: mpsc::Receiver<Arc<str>>,
    pub close: watch::Receiver<Option<&'static str>>,
}

impl ConnectionHandle {
    /// Create a handle with an outbound queue holding at most `capacity`
    /// undelivered messages.
    pub fn channel(name: impl Into<String>, capacity: usize) -> (Self, Mailbox) {
        let (outbound, messages) = mpsc::channel(capacity.max(1));
        let (close_tx, close) = watch::channel(None);
        let name: String = name.into();
        let handle = Self {
            id: prefixed_ulid(prefix::CONNECTION).into(),
            name: name.into(),
            outbound,
            close: Arc::new(close_tx),
        };
        (handle, Mailbox { messages, close })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `text` without waiting.
    pub fn deliver(&self, text: Arc<str>) -> Result<(), DeliveryError> {
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the owning task to close the connection. Never blocked by a full
    /// outbound queue.
    pub fn request_close(&self, reason: &'static str) {
        self.close.send_replace(Some(reason));
    }
}
