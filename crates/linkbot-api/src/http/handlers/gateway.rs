//! Gateway event ingress.
//!
//! POST /api/v1/gateway/{id}/events
//!
//! The protocol gateway posts one [`GatewayEvent`] per request. When
//! `[gateway].webhook_secret` is configured, requests must carry
//! `X-Linkbot-Timestamp` and an HMAC-SHA256 `X-Linkbot-Signature` over
//! `{timestamp}.{body}`, and the timestamp must be within five minutes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use secrecy::ExposeSecret;

use linkbot_infra::crypto::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use linkbot_infra::gateway::GatewayEvent;
use linkbot_types::session::SessionId;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Oldest (or furthest in the future) signed timestamp accepted.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

fn verify_request(secret: &[u8], headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let timestamp = header(headers, TIMESTAMP_HEADER)?;
    let signature_hex = header(headers, SIGNATURE_HEADER)?;

    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| AppError::Unauthorized("invalid timestamp".to_string()))?;
    if (chrono::Utc::now().timestamp() - sent_at).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(AppError::Unauthorized("timestamp outside the accepted window".to_string()));
    }

    signature::verify(secret, timestamp, body, signature_hex)
        .map_err(|_| AppError::Unauthorized("gateway signature verification failed".to_string()))
}

/// POST /api/v1/gateway/{id}/events - Receive one socket event from the gateway.
pub async fn receive_event(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let timer = RequestTimer::start();
    let id = SessionId::parse(raw_id)?;

    if let Some(secret) = state
        .config
        .gateway
        .as_ref()
        .and_then(|gateway| gateway.webhook_secret.as_ref())
    {
        verify_request(secret.expose_secret().as_bytes(), &headers, &body)?;
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid gateway event: {e}")))?;
    tracing::debug!(session_id = %id, event = ?event, "gateway event received");

    let accepted = state.inbox.dispatch(&id, event).await?;

    Ok(Json(ApiResponse::success(
        serde_json::json!({ "accepted": accepted }),
        &timer,
    )))
}
