use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::sessions;

/// Durable description of a session: its id, who may join, and when it was
/// opened and closed.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = sessions)]
pub struct SessionRecord {
    pub session_id: String,
    /// Seconds since the Unix epoch.
    pub created_at: f64,
    /// Seconds since the Unix epoch; `0` while the session is open.
    pub deleted_at: f64,
    pub allowed_users: Vec<String>,
}

impl SessionRecord {
    /// A fresh, open session with nobody allowed in yet.
    pub fn new(session_id: impl Into<String>, created_at: f64) -> Self {
        Self {
            session_id: session_id.into(),
            created_at,
            deleted_at: 0.0,
            allowed_users: Vec::new(),
        }
    }

    pub fn with_allowed_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_users = normalize_users(users.into_iter().map(Into::into));
        self
    }

    /// Closed sessions refuse new joins.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at != 0.0
    }

    pub fn allows(&self, name: &str) -> bool {
        self.allowed_users.iter().any(|u| u == name)
    }
}

/// Full replacement of a session's mutable fields, creating it if absent.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpsertSession {
    pub session_id: String,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Kept from the existing record (or set to now) when omitted.
    #[serde(default)]
    pub created_at: Option<f64>,
}

/// Outcome of [`SessionStore::upsert`](crate::db::store::SessionStore::upsert).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

/// Deduplicates names while keeping first-seen order.
pub fn normalize_users(users: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for user in users {
        if !out.contains(&user) {
            out.push(user);
        }
    }
    out
}
