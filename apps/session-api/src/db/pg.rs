//! PostgreSQL-backed [`SessionStore`].

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use scoped_futures::ScopedFutureExt;

use crate::db::schema::sessions;
use crate::db::store::{SessionStore, StoreError};
use crate::models::session::{normalize_users, SessionRecord, UpsertSession, Upserted};

pub type DbPool = Pool<AsyncPgConnection>;

pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    /// Build a connection pool for `database_url`. Connections are opened
    /// lazily, so this succeeds even while the database is unreachable.
    pub fn connect(database_url: &str) -> Result<Self, String> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(20)
            .build()
            .map_err(|e| format!("failed to build connection pool: {e}"))?;

        tracing::info!("database pool created");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let record: Option<SessionRecord> = diesel_async::RunQueryDsl::get_result(
            sessions::table
                .find(session_id)
                .select(SessionRecord::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<SessionRecord> = diesel_async::RunQueryDsl::load(
            sessions::table
                .order(sessions::created_at.asc())
                .select(SessionRecord::as_select()),
            &mut conn,
        )
        .await?;
        Ok(records)
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<SessionRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await?;
        let records: Vec<SessionRecord> = diesel_async::RunQueryDsl::load(
            sessions::table
                .filter(sessions::session_id.eq_any(ids))
                .order(sessions::created_at.asc())
                .select(SessionRecord::as_select()),
            &mut conn,
        )
        .await?;
        Ok(records)
    }

    async fn create(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let mut conn = self.pool.get().await?;
        let record: SessionRecord = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(sessions::table)
                .values(&record)
                .returning(SessionRecord::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(record)
    }

    /// Insert-or-update in one transaction. A concurrent insert of the same
    /// id makes `ON CONFLICT DO NOTHING` wait for it, then falls through to
    /// the update.
    async fn upsert(
        &self,
        upsert: &UpsertSession,
        now: f64,
    ) -> Result<(SessionRecord, Upserted), StoreError> {
        let allowed_users = normalize_users(upsert.allowed_users.iter().cloned());
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let candidate = SessionRecord {
                    session_id: upsert.session_id.clone(),
                    created_at: upsert.created_at.unwrap_or(now),
                    deleted_at: 0.0,
                    allowed_users: allowed_users.clone(),
                };
                let inserted: Option<SessionRecord> = diesel_async::RunQueryDsl::get_result(
                    diesel::insert_into(sessions::table)
                        .values(&candidate)
                        .on_conflict_do_nothing()
                        .returning(SessionRecord::as_returning()),
                    conn,
                )
                .await
                .optional()?;

                if let Some(record) = inserted {
                    return Ok((record, Upserted::Created));
                }

                let record = update_existing(
                    conn,
                    &upsert.session_id,
                    &allowed_users,
                    upsert.created_at,
                )
                .await?;
                Ok((record, Upserted::Updated))
            }
            .scope_boxed()
        })
        .await
    }

    async fn mark_deleted(&self, session_id: &str, at: f64) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;
        let updated = diesel_async::RunQueryDsl::execute(
            diesel::update(
                sessions::table
                    .filter(sessions::session_id.eq(session_id))
                    .filter(sessions::deleted_at.eq(0.0)),
            )
            .set(sessions::deleted_at.eq(at)),
            &mut conn,
        )
        .await?;
        Ok(updated > 0)
    }
}

/// Replace the allow list, and `created_at` only when one is given.
async fn update_existing(
    conn: &mut AsyncPgConnection,
    session_id: &str,
    allowed_users: &[String],
    created_at: Option<f64>,
) -> QueryResult<SessionRecord> {
    let target = sessions::table.find(session_id);
    match created_at {
        Some(created_at) => {
            diesel_async::RunQueryDsl::get_result(
                diesel::update(target)
                    .set((
                        sessions::allowed_users.eq(allowed_users),
                        sessions::created_at.eq(created_at),
                    ))
                    .returning(SessionRecord::as_returning()),
                conn,
            )
            .await
        }
        None => {
            diesel_async::RunQueryDsl::get_result(
                diesel::update(target)
                    .set(sessions::allowed_users.eq(allowed_users))
                    .returning(SessionRecord::as_returning()),
                conn,
            )
            .await
        }
    }
}
