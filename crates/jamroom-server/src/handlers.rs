//! HTTP handlers for the session directory and the WebSocket upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use jamroom_core::{GenreFilter, SessionDraft, SessionId, SessionRecord, ValidationError};
use jamroom_store::StoreError;

use crate::client;
use crate::context::AppContext;

/// Query keys accepted for the genre filter.
const GENRE_TAGS_KEYS: [&str; 2] = ["genreTags", "genreTags[]"];

/// Request failure mapped to an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.error_kind(), "message": e.to_string() })),
            )
                .into_response(),
            Self::Store(e) => {
                warn!(error = %e, kind = e.error_kind(), "directory request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "store_error",
                        "message": "session directory unavailable",
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Path of the session page for `id`.
pub fn session_path(id: &SessionId) -> String {
    format!("/session/{id}")
}

/// Resolve the raw `genreTags` query pairs into a filter.
pub fn genre_filter_from_query(pairs: &[(String, String)]) -> GenreFilter {
    GenreFilter::from_query_values(
        pairs
            .iter()
            .filter(|(key, _)| GENRE_TAGS_KEYS.contains(&key.as_str()))
            .map(|(_, value)| value.as_str()),
    )
}

/// `GET /join/public`
pub async fn list_public(
    State(ctx): State<AppContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let filter = genre_filter_from_query(&pairs);
    let records = ctx.directory.list(filter).await?;
    Ok(Json(records))
}

/// `POST /create/done`
pub async fn create_session(
    State(ctx): State<AppContext>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Redirect, ApiError> {
    let draft = SessionDraft::from_form(pairs)?;
    let visibility = draft.visibility;
    let session_id = ctx.directory.create(draft).await?;
    info!(session_id = %session_id, %visibility, "session created");
    Ok(Redirect::to(&session_path(&session_id)))
}

#[derive(Debug, Deserialize)]
pub struct PrivateJoinQuery {
    #[serde(rename = "sessionID")]
    session_id: Option<String>,
}

/// `GET /join/private`. No existence check.
pub async fn join_private(
    State(ctx): State<AppContext>,
    Query(query): Query<PrivateJoinQuery>,
) -> Result<Redirect, ApiError> {
    let raw = query
        .session_id
        .ok_or(ValidationError::Missing("sessionID"))?;
    let session_id = ctx.directory.resolve(SessionId::parse(&raw)?);
    Ok(Redirect::to(&session_path(&session_id)))
}

/// `GET /health`
pub async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "connections": ctx.gateway.connection_count(),
        "rooms": ctx.gateway.room_count(),
    }))
}

/// `GET /ws`
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client::handle_ws_connection(socket, ctx))
}
