#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use session_api::config::Config;
use session_api::db::store::{MemoryStore, SessionStore, StoreError};
use session_api::models::session::{SessionRecord, UpsertSession, Upserted};
use session_api::AppState;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for a frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config {
        port: 0,
        database_url: None,
        public_ws_url: "ws://test.local:8001".to_string(),
        handshake_timeout: Duration::from_secs(5),
        outbound_buffer: 64,
    }
}

/// Build a test AppState backed by an in-memory session store.
pub fn test_state_with(config: Config) -> AppState {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    AppState::new(store, config)
}

/// Session store whose database is down: every call fails.
pub struct UnreachableStore;

fn outage() -> StoreError {
    StoreError::Query(diesel::result::Error::BrokenTransactionManager)
}

#[async_trait]
impl SessionStore for UnreachableStore {
    async fn find(&self, _: &str) -> Result<Option<SessionRecord>, StoreError> {
        Err(outage())
    }
    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Err(outage())
    }
    async fn find_many(&self, _: &[String]) -> Result<Vec<SessionRecord>, StoreError> {
        Err(outage())
    }
    async fn create(&self, _: SessionRecord) -> Result<SessionRecord, StoreError> {
        Err(outage())
    }
    async fn upsert(&self, _: &UpsertSession, _: f64) -> Result<(SessionRecord, Upserted), StoreError> {
        Err(outage())
    }
    async fn mark_deleted(&self, _: &str, _: f64) -> Result<bool, StoreError> {
        Err(outage())
    }
}

pub fn unreachable_store_state() -> AppState {
    AppState::new(Arc::new(UnreachableStore), test_config())
}

pub fn test_state() -> AppState {
    test_state_with(test_config())
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = session_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = session_api::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Insert an open session directly into the store.
pub async fn seed_session(state: &AppState, session_id: &str, allowed: &[&str]) {
    let record = SessionRecord::new(session_id, huddle_common::time::now_secs())
        .with_allowed_users(allowed.iter().copied());
    state.store.create(record).await.expect("seed session");
}

pub async fn connect(addr: SocketAddr, session_id: &str) -> Ws {
    let url = format!("ws://{addr}/session/{session_id}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_text(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.into())).await.expect("send text");
}

/// Next frame, skipping pings and pongs.
pub async fn next_frame(ws: &mut Ws) -> Option<Message> {
    loop {
        let msg = time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame");
        match msg {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            Some(Err(_)) | None => return None,
        }
    }
}

pub async fn next_text(ws: &mut Ws) -> String {
    match next_frame(ws).await {
        Some(Message::Text(text)) => text.as_str().to_string(),
        other => panic!("expected text frame, got: {other:?}"),
    }
}

/// Assert the server closes the connection next.
pub async fn expect_closed(ws: &mut Ws) {
    match next_frame(ws).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected close, got: {other:?}"),
    }
}

/// Assert nothing arrives within `wait`.
pub async fn expect_silence(ws: &mut Ws, wait: Duration) {
    if let Ok(Some(msg)) = time::timeout(wait, ws.next()).await {
        panic!("expected no frame, got: {msg:?}");
    }
}

/// Open a connection and complete the join handshake as `name`.
pub async fn join(addr: SocketAddr, session_id: &str, name: &str) -> Ws {
    let mut ws = connect(addr, session_id).await;
    send_text(&mut ws, name).await;
    assert_eq!(next_text(&mut ws).await, "server:: You've joined.");
    ws
}

/// Wait until the registry shows `count` live connections for a session.
pub async fn wait_for_connections(state: &AppState, session_id: &str, count: usize) {
    time::timeout(RECV_TIMEOUT, async {
        while state.registry.connection_count(session_id) != count {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for registry");
}
