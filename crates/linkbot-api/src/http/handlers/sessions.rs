//! Session HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/sessions               - List sessions known to this process
//! - GET    /api/v1/sessions/{id}          - Current status of a session
//! - POST   /api/v1/sessions/{id}/connect  - Start connecting (returns immediately)
//! - DELETE /api/v1/sessions/{id}          - Log out and forget credentials
//! - POST   /api/v1/sessions/{id}/messages - Send a text message
//! - GET    /api/v1/sessions/{id}/events   - Server-sent status updates

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use linkbot_types::session::{
    ConnectionStatus, CorrespondentId, SessionId, SessionStatus, SessionSummary,
};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Request body for sending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Correspondent to deliver to.
    pub to: String,
    pub text: String,
}

fn parse_session_id(raw: String) -> Result<SessionId, AppError> {
    Ok(SessionId::parse(raw)?)
}

/// GET /api/v1/sessions - List sessions known to this process.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<SessionSummary>>> {
    let timer = RequestTimer::start();

    let sessions = state.registry.sessions();

    Json(ApiResponse::success(sessions, &timer).with_link("self", "/api/v1/sessions"))
}

/// GET /api/v1/sessions/{id} - Current status of a session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<SessionSummary>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_session_id(raw_id)?;

    let summary = SessionSummary {
        status: state.registry.status(&id),
        id: id.clone(),
    };

    let resp = ApiResponse::success(summary, &timer)
        .with_link("self", format!("/api/v1/sessions/{id}"))
        .with_link("events", format!("/api/v1/sessions/{id}/events"));
    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/connect - Start connecting a session.
///
/// Pairing completes asynchronously; follow `/events` for the pairing code.
pub async fn connect_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<SessionSummary>>), AppError> {
    let timer = RequestTimer::start();
    let id = parse_session_id(raw_id)?;

    let current = state.registry.status(&id);
    let reported = if current.status.is_active() {
        current
    } else {
        SessionStatus {
            status: ConnectionStatus::Connecting,
            ..SessionStatus::default()
        }
    };

    let registry = state.registry.clone();
    let task_id = id.clone();
    tokio::spawn(async move {
        registry.connect(&task_id).await;
    });

    let resp = ApiResponse::success(
        SessionSummary {
            id: id.clone(),
            status: reported,
        },
        &timer,
    )
    .with_link("events", format!("/api/v1/sessions/{id}/events"));
    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// DELETE /api/v1/sessions/{id} - Log out, unlink the device, forget credentials.
pub async fn logout_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<SessionSummary>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_session_id(raw_id)?;

    state.registry.logout(&id).await;
    tracing::info!(session_id = %id, "session logged out via API");

    let summary = SessionSummary {
        status: state.registry.status(&id),
        id,
    };
    Ok(Json(ApiResponse::success(summary, &timer)))
}

/// POST /api/v1/sessions/{id}/messages - Send a text message.
pub async fn send_message(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    let id = parse_session_id(raw_id)?;

    let correspondent = CorrespondentId::parse(body.to)?;
    if body.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }

    state
        .registry
        .send_message(&id, &correspondent, body.text)
        .await?;

    let resp = ApiResponse::success(
        serde_json::json!({ "session_id": id, "to": correspondent, "status": "sent" }),
        &timer,
    );
    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id}/events - Server-sent status updates.
///
/// Emits the current status immediately, then one `status` event per
/// change.
pub async fn session_events(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let id = parse_session_id(raw_id)?;
    let updates = state.registry.watch(&id);

    let stream = WatchStream::new(updates)
        .map(|status| Event::default().event("status").json_data(status));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
