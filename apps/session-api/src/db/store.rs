use std::collections::HashMap;

use async_trait::async_trait;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use parking_lot::RwLock;

use crate::models::session::{normalize_users, SessionRecord, UpsertSession, Upserted};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),
    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Abstraction over the durable home of session records.
///
/// Backed by PostgreSQL in production and an in-memory map in tests and
/// single-process deployments. The session gateway only ever calls
/// [`find`](SessionStore::find).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Records whose id is in `ids`, oldest first. Unknown ids are skipped.
    async fn find_many(&self, ids: &[String]) -> Result<Vec<SessionRecord>, StoreError>;

    async fn create(&self, record: SessionRecord) -> Result<SessionRecord, StoreError>;

    async fn upsert(
        &self,
        upsert: &UpsertSession,
        now: f64,
    ) -> Result<(SessionRecord, Upserted), StoreError>;

    /// Sets `deleted_at` on an open session. Returns `false` when the session
    /// is unknown or already closed.
    async fn mark_deleted(&self, session_id: &str, at: f64) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(mut records: Vec<SessionRecord>) -> Vec<SessionRecord> {
    records.sort_by(|a, b| a.created_at.total_cmp(&b.created_at));
    records
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.data.read().get(session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(oldest_first(self.data.read().values().cloned().collect()))
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<SessionRecord>, StoreError> {
        let data = self.data.read();
        Ok(oldest_first(
            ids.iter().filter_map(|id| data.get(id).cloned()).collect(),
        ))
    }

    /// Fails with a unique violation when the id is taken, like the
    /// `sessions` primary key.
    async fn create(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let mut data = self.data.write();
        if data.contains_key(&record.session_id) {
            return Err(StoreError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                Box::new(format!("session {} already exists", record.session_id)),
            )));
        }
        data.insert(record.session_id.clone(), record.clone());
        Ok(record)
    }

    async fn upsert(
        &self,
        upsert: &UpsertSession,
        now: f64,
    ) -> Result<(SessionRecord, Upserted), StoreError> {
        let allowed_users = normalize_users(upsert.allowed_users.iter().cloned());
        let mut data = self.data.write();
        match data.get_mut(&upsert.session_id) {
            Some(existing) => {
                existing.allowed_users = allowed_users;
                if let Some(created_at) = upsert.created_at {
                    existing.created_at = created_at;
                }
                Ok((existing.clone(), Upserted::Updated))
            }
            None => {
                let record = SessionRecord {
                    session_id: upsert.session_id.clone(),
                    created_at: upsert.created_at.unwrap_or(now),
                    deleted_at: 0.0,
                    allowed_users,
                };
                data.insert(record.session_id.clone(), record.clone());
                Ok((record, Upserted::Created))
            }
        }
    }

    async fn mark_deleted(&self, session_id: &str, at: f64) -> Result<bool, StoreError> {
        let mut data = self.data.write();
        match data.get_mut(session_id) {
            Some(record) if !record.is_deleted() => {
                record.deleted_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
