use std::time::Duration;

/// Session API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// PostgreSQL connection string. When unset, session records are kept in
    /// memory for the lifetime of the process.
    pub database_url: Option<String>,
    /// Public WebSocket origin used to build invite links
    /// (e.g. `ws://localhost:8001`).
    pub public_ws_url: String,
    /// How long a new connection may take to send its display name.
    pub handshake_timeout: Duration,
    /// Capacity of each connection's outbound message queue.
    pub outbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let port = parsed_var("PORT").unwrap_or(8001);
        Self {
            port,
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            public_ws_url: std::env::var("PUBLIC_WS_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("ws://0.0.0.0:{port}")),
            handshake_timeout: Duration::from_secs(parsed_var("HANDSHAKE_TIMEOUT_SECS").unwrap_or(30)),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER").filter(|n| *n > 0).unwrap_or(256),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// `postgres://host/huddle?x=y` -> `postgres://host/huddle_test?x=y`
pub fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };

    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_suffix_keeps_query() {
        assert_eq!(
            with_test_db_suffix("postgres://u:p@host:5432/huddle?sslmode=disable"),
            "postgres://u:p@host:5432/huddle_test?sslmode=disable"
        );
        assert_eq!(
            with_test_db_suffix("postgres://host/huddle"),
            "postgres://host/huddle_test"
        );
    }

    #[test]
    fn test_db_suffix_is_idempotent() {
        assert_eq!(
            with_test_db_suffix("postgres://host/huddle_test"),
            "postgres://host/huddle_test"
        );
    }
}
