pub mod health;
pub mod sessions;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(sessions::router())
        .merge(crate::gateway::server::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::status,
        // Sessions
        sessions::list_sessions,
        sessions::create_session,
        sessions::upsert_session,
        sessions::delete_session,
        sessions::create_invite,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::session::SessionRecord,
            crate::models::session::UpsertSession,
            // Route request/response types
            health::StatusResponse,
            sessions::SessionView,
            sessions::ListSessionsResponse,
            sessions::MessageResponse,
            sessions::DeleteSessionRequest,
            sessions::InviteResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Sessions", description = "Session records"),
    )
)]
pub struct ApiDoc;
