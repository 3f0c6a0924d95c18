//! Session record endpoints.
//!
//! `active_users` is never stored; it is read from the connection registry
//! whenever a record is returned.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use huddle_common::id::{prefix, prefixed_ulid};
use huddle_common::time::now_secs;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::registry::ConnectionRegistry;
use crate::models::session::{SessionRecord, UpsertSession, Upserted};
use crate::AppState;

/// Close reason sent to participants still connected to a deleted session.
const SESSION_DELETED_REASON: &str = "Session deleted";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/session",
            get(list_sessions)
                .post(create_session)
                .put(upsert_session)
                .delete(delete_session),
        )
        .route("/session/{session_id}/invite", post(create_invite))
}

/// A session record as returned to clients, with live membership attached.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub session_id: String,
    pub created_at: f64,
    pub deleted_at: f64,
    pub allowed_users: Vec<String>,
    /// Display names currently connected.
    pub active_users: Vec<String>,
}

impl SessionView {
    fn new(record: SessionRecord, registry: &ConnectionRegistry) -> Self {
        let active_users = registry.members(&record.session_id);
        Self {
            session_id: record.session_id,
            created_at: record.created_at,
            deleted_at: record.deleted_at,
            allowed_users: record.allowed_users,
            active_users,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            session_id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /session
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSessionsParams {
    /// Return only this session.
    pub session_id: Option<String>,
    /// Return only sessions with at least one live connection.
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionView>,
}

#[utoipa::path(
    get,
    path = "/session",
    tag = "Sessions",
    params(ListSessionsParams),
    responses(
        (status = 200, description = "Matching sessions", body = ListSessionsResponse),
        (status = 400, description = "Conflicting filters", body = ApiErrorBody),
    )
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let active = params.active.unwrap_or(false);

    let records = match (params.session_id, active) {
        (Some(_), true) => return Err(ApiError::bad_request("Can't filter by both params.")),
        (Some(session_id), false) => state.store.find(&session_id).await?.into_iter().collect(),
        (None, true) => {
            let live = state.registry.active_sessions();
            state.store.find_many(&live).await?
        }
        (None, false) => state.store.list().await?,
    };

    let sessions = records
        .into_iter()
        .map(|record| SessionView::new(record, &state.registry))
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

// ---------------------------------------------------------------------------
// POST /session
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/session",
    tag = "Sessions",
    responses((status = 201, description = "Session created", body = MessageResponse))
)]
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let record = SessionRecord::new(prefixed_ulid(prefix::SESSION), now_secs());
    let record = state.store.create(record).await?;

    tracing::info!(session_id = %record.session_id, "session created");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Session created.".to_string(),
            session_id: Some(record.session_id),
        }),
    ))
}

// ---------------------------------------------------------------------------
// PUT /session
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/session",
    tag = "Sessions",
    request_body = UpsertSession,
    responses(
        (status = 200, description = "Session updated", body = MessageResponse),
        (status = 201, description = "Session created", body = MessageResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    )
)]
pub async fn upsert_session(
    State(state): State<AppState>,
    Json(body): Json<UpsertSession>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let mut errors = Vec::new();
    if body.session_id.trim().is_empty() {
        errors.push(FieldError {
            field: "session_id".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if body.allowed_users.iter().any(|u| u.is_empty()) {
        errors.push(FieldError {
            field: "allowed_users".to_string(),
            message: "names must not be empty".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let (record, outcome) = state.store.upsert(&body, now_secs()).await?;

    tracing::info!(
        session_id = %record.session_id,
        allowed = record.allowed_users.len(),
        ?outcome,
        "session upserted"
    );

    Ok(match outcome {
        Upserted::Created => (
            StatusCode::CREATED,
            Json(MessageResponse::new("Session didn't exist, so it was created.")),
        ),
        Upserted::Updated => (StatusCode::OK, Json(MessageResponse::new("Session updated."))),
    })
}

// ---------------------------------------------------------------------------
// DELETE /session
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

#[utoipa::path(
    delete,
    path = "/session",
    tag = "Sessions",
    request_body = DeleteSessionRequest,
    responses(
        (status = 200, description = "Session closed", body = MessageResponse),
        (status = 404, description = "Unknown or already closed", body = ApiErrorBody),
    )
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Json(body): Json<DeleteSessionRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.store.mark_deleted(&body.session_id, now_secs()).await? {
        return Err(ApiError::not_found("Session wasn't found."));
    }

    let disconnected = state
        .registry
        .close_session(&body.session_id, SESSION_DELETED_REASON);

    tracing::info!(session_id = %body.session_id, disconnected, "session deleted");

    Ok(Json(MessageResponse::new("Session was deleted.")))
}

// ---------------------------------------------------------------------------
// POST /session/:session_id/invite
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct InviteResponse {
    pub message: String,
    pub link: String,
}

#[utoipa::path(
    post,
    path = "/session/{session_id}/invite",
    tag = "Sessions",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 201, description = "Invite link created", body = InviteResponse),
        (status = 404, description = "Unknown or closed session", body = ApiErrorBody),
    )
)]
pub async fn create_invite(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    let open = state
        .store
        .find(&session_id)
        .await?
        .is_some_and(|record| !record.is_deleted());
    if !open {
        return Err(ApiError::not_found("Session wasn't found."));
    }

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            message: "Invite link created".to_string(),
            link: format!("{}/session/{session_id}", state.config.public_ws_url),
        }),
    ))
}
