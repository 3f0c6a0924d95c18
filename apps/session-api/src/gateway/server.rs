//! WebSocket upgrade handler and per-connection lifecycle.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::AppState;

use super::handle::{ConnectionHandle, Mailbox};
use super::handshake::{self, JoinRejection, CLOSE_SESSION_DELETED, JOIN_ACK};
use super::registry::ConnectionRegistry;
use super::relay;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Stages a gateway connection moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Joined,
    Relaying,
    Closed,
}

impl ConnectionState {
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Joined)
                | (Authenticating, Closed)
                | (Joined, Relaying)
                | (Joined, Closed)
                | (Relaying, Closed)
        )
    }
}

/// Tracks and logs one connection's state transitions.
struct Lifecycle<'a> {
    session_id: &'a str,
    state: ConnectionState,
}

impl<'a> Lifecycle<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            state: ConnectionState::Connecting,
        }
    }

    fn advance(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(session_id = self.session_id, from = ?self.state, to = ?next, "gateway state");
        self.state = next;
    }
}

/// How a relaying connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseCause {
    ClientClosed,
    TransportError,
    SessionDeleted,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/session/{session_id}", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, session_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut lifecycle = Lifecycle::new(&session_id);

    lifecycle.advance(ConnectionState::Authenticating);
    let name = match authenticate(&state, &session_id, &mut ws_rx).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            tracing::debug!(%session_id, "client left during handshake");
            lifecycle.advance(ConnectionState::Closed);
            return;
        }
        Err(rejection) => {
            tracing::info!(%session_id, reason = %rejection, "join rejected");
            reject(&mut ws_tx, &rejection).await;
            lifecycle.advance(ConnectionState::Closed);
            return;
        }
    };

    // Registered before the ack goes out so nothing sent after the client
    // sees the ack can miss it. Anything relayed in between waits in the
    // mailbox until the loop below starts.
    let (handle, mailbox) = ConnectionHandle::channel(name, state.config.outbound_buffer);
    let registration = state.registry.register(&session_id, handle.clone());

    // The name wait can outlast a delete or an allow-list change. Deletion
    // marks the record before closing registered handles, so this second
    // read sees the delete or the handle gets closed with the others.
    if let Err(rejection) = confirm_admission(&state, &session_id, handle.name()).await {
        registration.release();
        tracing::info!(%session_id, reason = %rejection, "join rejected after name");
        reject(&mut ws_tx, &rejection).await;
        lifecycle.advance(ConnectionState::Closed);
        return;
    }
    lifecycle.advance(ConnectionState::Joined);

    if ws_tx.send(Message::Text(JOIN_ACK.into())).await.is_err() {
        lifecycle.advance(ConnectionState::Closed);
        return;
    }

    tracing::info!(
        %session_id,
        handle_id = handle.id(),
        name = handle.name(),
        "participant joined"
    );

    lifecycle.advance(ConnectionState::Relaying);
    let cause = run_relay(&state.registry, &session_id, &handle, ws_tx, ws_rx, mailbox).await;

    let was_registered = registration.release();
    lifecycle.advance(ConnectionState::Closed);

    tracing::info!(
        %session_id,
        handle_id = handle.id(),
        name = handle.name(),
        ?cause,
        was_registered,
        "participant left"
    );
}

/// Look up the session, read the display name, and check it against the
/// allow list. `Ok(None)` means the client went away mid-handshake.
async fn authenticate(
    state: &AppState,
    session_id: &str,
    ws_rx: &mut WsStream,
) -> Result<Option<String>, JoinRejection> {
    let record = handshake::lookup_session(state.store.as_ref(), session_id).await?;

    let Some(name) = handshake::read_display_name(ws_rx, state.config.handshake_timeout).await?
    else {
        return Ok(None);
    };

    handshake::admit(&record, &name)?;
    Ok(Some(name))
}

/// Re-read the record once the handle is registered.
async fn confirm_admission(
    state: &AppState,
    session_id: &str,
    name: &str,
) -> Result<(), JoinRejection> {
    let record = handshake::lookup_session(state.store.as_ref(), session_id).await?;
    handshake::admit(&record, name)
}

async fn reject(ws_tx: &mut WsSink, rejection: &JoinRejection) {
    if let Some(text) = rejection.client_message() {
        if ws_tx.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
    let _ = send_close(ws_tx, rejection.close_code(), rejection.close_reason()).await;
}

/// Steady state: relay inbound text to the session and write queued
/// messages from other participants out to this client.
async fn run_relay(
    registry: &Arc<ConnectionRegistry>,
    session_id: &str,
    handle: &ConnectionHandle,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut mailbox: Mailbox,
) -> CloseCause {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let report = relay::broadcast(registry, session_id, handle, text.as_str());
                        tracing::trace!(
                            session_id,
                            handle_id = handle.id(),
                            delivered = report.delivered,
                            dropped = report.dropped,
                            "message relayed"
                        );
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseCause::ClientClosed,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id, handle_id = handle.id(), "ws read error");
                        return CloseCause::TransportError;
                    }
                    // Ping/pong are answered by the transport; binary frames carry no chat.
                    Some(Ok(_)) => continue,
                }
            }

            Some(text) = mailbox.messages.recv() => {
                if ws_tx.send(Message::Text(text.as_ref().into())).await.is_err() {
                    return CloseCause::TransportError;
                }
            }

            Ok(()) = mailbox.close.changed() => {
                let reason = (*mailbox.close.borrow()).unwrap_or("Session closed");
                let _ = send_close(&mut ws_tx, CLOSE_SESSION_DELETED, reason).await;
                return CloseCause::SessionDeleted;
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    ws_tx.send(close_msg).await
}
