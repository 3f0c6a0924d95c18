use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_api::config::Config;
use session_api::db::pg::PgSessionStore;
use session_api::db::store::{MemoryStore, SessionStore};
use session_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file; a missing file is fine
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn SessionStore> = match config.database_url.as_deref() {
        Some(url) => match PgSessionStore::connect(url) {
            Ok(store) => Arc::new(store),
            Err(err) => {
                tracing::error!(%err, "cannot use DATABASE_URL");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set; session records are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(
        public_ws_url = %config.public_ws_url,
        handshake_timeout = ?config.handshake_timeout,
        "session-api configured"
    );

    let state = AppState::new(store, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(session_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "session-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
