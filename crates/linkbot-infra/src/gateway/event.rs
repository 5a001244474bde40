//! Wire format of events posted by the protocol gateway.
//!
//! ```json
//! {"type": "pairing_code", "code": "2@AbC..."}
//! {"type": "opened"}
//! {"type": "credentials", "credentials": "<base64 blob>"}
//! {"type": "message", "from": "4915123@s.net", "text": "hello"}
//! {"type": "closed", "reason": "timed_out", "message": "keep-alive lost"}
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use linkbot_types::session::CorrespondentId;
use linkbot_types::socket::{CloseReason, Credentials, SocketEvent};
use serde::{Deserialize, Serialize};

use super::GatewayError;

/// One event as posted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    PairingCode {
        code: String,
    },
    Opened,
    Credentials {
        credentials: String,
    },
    Message {
        from: String,
        #[serde(default)]
        text: Option<String>,
    },
    Closed {
        reason: String,
        #[serde(default)]
        message: Option<String>,
    },
}

impl GatewayEvent {
    /// Convert into a socket event.
    ///
    /// Returns `Ok(None)` for events the manager does not act on (messages
    /// without text, such as media or reactions).
    pub fn into_socket_event(self) -> Result<Option<SocketEvent>, GatewayError> {
        let event = match self {
            GatewayEvent::PairingCode { code } => {
                if code.trim().is_empty() {
                    return Err(GatewayError::InvalidEvent("empty pairing code".to_string()));
                }
                SocketEvent::PairingCode(code)
            }
            GatewayEvent::Opened => SocketEvent::Opened,
            GatewayEvent::Credentials { credentials } => {
                let bytes = BASE64
                    .decode(credentials.as_bytes())
                    .map_err(|e| GatewayError::InvalidEvent(format!("credentials are not base64: {e}")))?;
                SocketEvent::CredentialsUpdated(Credentials::new(bytes))
            }
            GatewayEvent::Message { from, text } => {
                let correspondent = CorrespondentId::parse(from)
                    .map_err(|e| GatewayError::InvalidEvent(e.to_string()))?;
                match text {
                    Some(text) if !text.trim().is_empty() => SocketEvent::Inbound { correspondent, text },
                    _ => return Ok(None),
                }
            }
            GatewayEvent::Closed { reason, message } => SocketEvent::Closed(close_reason(&reason, message)),
        };
        Ok(Some(event))
    }
}

fn close_reason(reason: &str, message: Option<String>) -> CloseReason {
    let detail = || message.clone().unwrap_or_else(|| reason.to_string());
    match reason {
        "logged_out" => CloseReason::LoggedOut,
        "banned" | "forbidden" => CloseReason::Banned(detail()),
        "bad_session" => CloseReason::BadSession(detail()),
        "connection_lost" | "connection_closed" => CloseReason::ConnectionLost,
        "timed_out" => CloseReason::TimedOut,
        "restart_required" => CloseReason::RestartRequired,
        "replaced" | "connection_replaced" => CloseReason::Replaced,
        _ => CloseReason::Other(detail()),
    }
}
