//! Protocol gateway bridge.
//!
//! The end-to-end-encrypted wire protocol runs in a separate gateway
//! process. Linkbot drives it over HTTP:
//!
//! - `POST {url}/sessions/{id}/connect` opens a socket, seeded with
//!   base64 credentials when the session paired before.
//! - `POST {url}/sessions/{id}/messages` sends `{to, text}`.
//! - `POST {url}/sessions/{id}/logout` unlinks the device.
//! - `DELETE {url}/sessions/{id}` closes the socket.
//!
//! The gateway reports socket events back by posting [`GatewayEvent`]s to
//! Linkbot's ingress route, which hands them to [`GatewayInbox::dispatch`].

pub mod connector;
pub mod event;
pub mod inbox;

pub use connector::{GatewayConnector, GatewaySocket};
pub use event::GatewayEvent;
pub use inbox::GatewayInbox;

use thiserror::Error;

/// Errors raised while routing gateway events.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no open socket for session {0}")]
    UnknownSession(String),

    #[error("invalid gateway event: {0}")]
    InvalidEvent(String),

    #[error("socket for session {0} stopped reading events")]
    Closed(String),
}
