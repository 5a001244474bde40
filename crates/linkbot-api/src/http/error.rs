//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use linkbot_infra::gateway::GatewayError;
use linkbot_types::error::SessionError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Session registry errors.
    Session(SessionError),
    /// Gateway event routing errors.
    Gateway(GatewayError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        AppError::Gateway(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Session(e @ SessionError::InvalidSessionId(_))
            | AppError::Session(e @ SessionError::InvalidCorrespondentId) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Session(e @ SessionError::NotConnected(_)) => {
                (StatusCode::CONFLICT, "NOT_CONNECTED", e.to_string())
            }
            AppError::Session(e @ SessionError::SendFailed(_)) => {
                (StatusCode::BAD_GATEWAY, "SEND_FAILED", e.to_string())
            }
            AppError::Gateway(e @ GatewayError::UnknownSession(_)) => {
                (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", e.to_string())
            }
            AppError::Gateway(e @ GatewayError::InvalidEvent(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Gateway(e @ GatewayError::Closed(_)) => {
                (StatusCode::GONE, "SOCKET_CLOSED", e.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }
        let body = ApiResponse::error(code, message);
        (status, Json(body)).into_response()
    }
}
