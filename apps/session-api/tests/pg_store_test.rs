//! PostgreSQL store tests.
//!
//! These run against the `_test` database derived from `DATABASE_URL`
//! (migrate it with `session-migrate -- --test`). Without `DATABASE_URL`
//! each test returns early.

use std::path::Path;
use std::sync::Arc;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use huddle_common::id::{prefix, prefixed_ulid};

use session_api::config::with_test_db_suffix;
use session_api::db::pg::PgSessionStore;
use session_api::db::schema::sessions;
use session_api::db::store::{SessionStore, StoreError};
use session_api::models::session::{SessionRecord, UpsertSession, Upserted};

fn pg_store() -> Option<PgSessionStore> {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }
    let database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|s| !s.is_empty())?;
    Some(PgSessionStore::connect(&with_test_db_suffix(&database_url)).expect("pool"))
}

async fn cleanup(store: &PgSessionStore, ids: &[String]) {
    let mut conn = store.pool().get().await.expect("pool");
    diesel_async::RunQueryDsl::execute(
        diesel::delete(sessions::table.filter(sessions::session_id.eq_any(ids))),
        &mut conn,
    )
    .await
    .expect("cleanup sessions");
}

fn upsert(session_id: &str, users: &[&str], created_at: Option<f64>) -> UpsertSession {
    UpsertSession {
        session_id: session_id.to_string(),
        allowed_users: users.iter().map(|u| u.to_string()).collect(),
        created_at,
    }
}

#[tokio::test]
async fn create_then_find_and_refuse_taken_id() {
    let Some(store) = pg_store() else { return };
    let id = prefixed_ulid(prefix::SESSION);

    let record = SessionRecord::new(id.clone(), 1_700_000_000.25).with_allowed_users(["alice"]);
    store.create(record.clone()).await.unwrap();
    assert_eq!(store.find(&id).await.unwrap(), Some(record.clone()));

    let err = store
        .create(SessionRecord::new(id.clone(), 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _
        ))
    ));
    assert_eq!(store.find(&id).await.unwrap(), Some(record));

    cleanup(&store, &[id]).await;
}

#[tokio::test]
async fn upsert_creates_then_updates_keeping_created_at() {
    let Some(store) = pg_store() else { return };
    let id = prefixed_ulid(prefix::SESSION);

    let (created, outcome) = store
        .upsert(&upsert(&id, &["alice", "alice", "bob"], None), 42.0)
        .await
        .unwrap();
    assert_eq!(outcome, Upserted::Created);
    assert_eq!(created.created_at, 42.0);
    assert_eq!(created.allowed_users, vec!["alice", "bob"]);

    let (updated, outcome) = store.upsert(&upsert(&id, &["carol"], None), 99.0).await.unwrap();
    assert_eq!(outcome, Upserted::Updated);
    assert_eq!(updated.created_at, 42.0);
    assert_eq!(updated.allowed_users, vec!["carol"]);

    let (moved, _) = store.upsert(&upsert(&id, &[], Some(7.0)), 99.0).await.unwrap();
    assert_eq!(moved.created_at, 7.0);
    assert!(moved.allowed_users.is_empty());

    cleanup(&store, &[id]).await;
}

#[tokio::test]
async fn concurrent_upserts_of_a_new_id_create_once() {
    let Some(store) = pg_store() else { return };
    let store = Arc::new(store);
    let id = prefixed_ulid(prefix::SESSION);

    let mut tasks = Vec::new();
    for name in ["alice", "bob", "carol", "dave"] {
        let store = Arc::clone(&store);
        let body = upsert(&id, &[name], None);
        tasks.push(tokio::spawn(async move { store.upsert(&body, 1.0).await }));
    }

    let mut created = 0;
    for task in tasks {
        let (_, outcome) = task.await.unwrap().unwrap();
        if outcome == Upserted::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    cleanup(&store, &[id]).await;
}

#[tokio::test]
async fn mark_deleted_only_once_and_upsert_does_not_reopen() {
    let Some(store) = pg_store() else { return };
    let id = prefixed_ulid(prefix::SESSION);
    store.create(SessionRecord::new(id.clone(), 1.0)).await.unwrap();

    assert!(store.mark_deleted(&id, 2.0).await.unwrap());
    assert!(!store.mark_deleted(&id, 3.0).await.unwrap());
    assert!(!store
        .mark_deleted(&prefixed_ulid(prefix::SESSION), 3.0)
        .await
        .unwrap());

    let (record, outcome) = store.upsert(&upsert(&id, &["alice"], None), 4.0).await.unwrap();
    assert_eq!(outcome, Upserted::Updated);
    assert_eq!(record.deleted_at, 2.0);
    assert!(record.is_deleted());

    cleanup(&store, &[id]).await;
}

#[tokio::test]
async fn find_many_is_oldest_first_and_skips_unknown() {
    let Some(store) = pg_store() else { return };
    let late = prefixed_ulid(prefix::SESSION);
    let early = prefixed_ulid(prefix::SESSION);
    store.create(SessionRecord::new(late.clone(), 20.0)).await.unwrap();
    store.create(SessionRecord::new(early.clone(), 10.0)).await.unwrap();

    let ids: Vec<String> = store
        .find_many(&[late.clone(), "ses_unknown".to_string(), early.clone()])
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.session_id)
        .collect();
    assert_eq!(ids, vec![early.clone(), late.clone()]);
    assert!(store.find_many(&[]).await.unwrap().is_empty());

    cleanup(&store, &[late, early]).await;
}
