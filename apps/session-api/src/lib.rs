pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::store::SessionStore;
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Fresh state with an empty connection registry.
    pub fn new(store: Arc<dyn SessionStore>, config: Config) -> Self {
        Self {
            store,
            registry: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
        }
    }
}
