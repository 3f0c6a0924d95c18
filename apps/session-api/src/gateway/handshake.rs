//! Admission of a new connection into a session.
//!
//! The session record is looked up before anything is read from the client
//! and again once the handle is registered. The first text frame the client
//! sends is its display name; it is checked against the record's
//! `allowed_users` at admission only and never relayed.

use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tokio::time;

use crate::db::store::{SessionStore, StoreError};
use crate::models::session::SessionRecord;

pub const SESSION_MISSING_MESSAGE: &str = "Session does not exist. Please create it first.";
pub const NOT_ALLOWED_MESSAGE: &str = "You are not allowed in this session.";
pub const JOIN_ACK: &str = "server:: You've joined.";

/// Close codes (4000-range for application-level).
pub const CLOSE_NOT_AUTHORIZED: u16 = 4003;
pub const CLOSE_SESSION_NOT_FOUND: u16 = 4004;
pub const CLOSE_HANDSHAKE_TIMEOUT: u16 = 4009;
pub const CLOSE_SESSION_DELETED: u16 = 4010;

/// Why a connection was refused entry.
#[derive(Debug, thiserror::Error)]
pub enum JoinRejection {
    #[error("session {0} does not exist")]
    SessionNotFound(String),
    #[error("session {0} has been closed")]
    SessionClosed(String),
    #[error("session store unavailable")]
    StoreUnavailable(#[source] StoreError),
    #[error("{name:?} is not allowed in session {session_id}")]
    NotAuthorized { session_id: String, name: String },
    #[error("no display name received within {0:?}")]
    HandshakeTimeout(Duration),
}

impl JoinRejection {
    /// Text frame sent to the client before closing, if any.
    ///
    /// Closed sessions and store outages look the same as a missing session
    /// from the outside.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            Self::SessionNotFound(_) | Self::SessionClosed(_) | Self::StoreUnavailable(_) => {
                Some(SESSION_MISSING_MESSAGE)
            }
            Self::NotAuthorized { .. } => Some(NOT_ALLOWED_MESSAGE),
            Self::HandshakeTimeout(_) => None,
        }
    }

    pub fn close_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) | Self::StoreUnavailable(_) => CLOSE_SESSION_NOT_FOUND,
            Self::SessionClosed(_) => CLOSE_SESSION_DELETED,
            Self::NotAuthorized { .. } => CLOSE_NOT_AUTHORIZED,
            Self::HandshakeTimeout(_) => CLOSE_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) | Self::StoreUnavailable(_) => "Session not found",
            Self::SessionClosed(_) => "Session closed",
            Self::NotAuthorized { .. } => "Not authorized",
            Self::HandshakeTimeout(_) => "Handshake timeout",
        }
    }
}

/// Step 1: find an open session record.
pub async fn lookup_session(
    store: &dyn SessionStore,
    session_id: &str,
) -> Result<SessionRecord, JoinRejection> {
    let record = store.find(session_id).await.map_err(|err| {
        tracing::error!(?err, session_id, "session lookup failed");
        JoinRejection::StoreUnavailable(err)
    })?;

    match record {
        None => Err(JoinRejection::SessionNotFound(session_id.to_string())),
        Some(record) if record.is_deleted() => {
            Err(JoinRejection::SessionClosed(session_id.to_string()))
        }
        Some(record) => Ok(record),
    }
}

/// Step 2: wait for the display name.
///
/// Returns `Ok(None)` when the client goes away first. Control and binary
/// frames are skipped.
pub async fn read_display_name<S, E>(
    rx: &mut S,
    timeout: Duration,
) -> Result<Option<String>, JoinRejection>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Debug,
{
    let read = async {
        while let Some(msg) = rx.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(text.as_str().to_string()),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(?e, "ws read error during handshake");
                    return None;
                }
            }
        }
        None
    };

    time::timeout(timeout, read)
        .await
        .map_err(|_| JoinRejection::HandshakeTimeout(timeout))
}

/// Step 3: the name must be on the session's allow list.
pub fn admit(record: &SessionRecord, name: &str) -> Result<(), JoinRejection> {
    if record.allows(name) {
        Ok(())
    } else {
        Err(JoinRejection::NotAuthorized {
            session_id: record.session_id.clone(),
            name: name.to_string(),
        })
    }
}
