use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Maximum length of a session identifier.
const MAX_SESSION_ID_LEN: usize = 128;

/// Stable identifier of one logical connection to the messaging network.
///
/// One operator-configured integration instance maps to exactly one
/// `SessionId`. Only ASCII alphanumerics and `_ . : -` are accepted so the
/// id can travel safely in URL paths and log fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate a session identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(SessionError::InvalidSessionId(raw));
        }
        let valid = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'));
        if !valid {
            return Err(SessionError::InvalidSessionId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The remote party on the other end of a conversation within a session.
///
/// Opaque to the core: the socket layer decides its format (a phone-number
/// address, a group id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrespondentId(String);

impl CorrespondentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validating constructor used at trust boundaries (gateway ingress).
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(SessionError::InvalidCorrespondentId);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrespondentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection lifecycle states of a session.
///
/// - Disconnected: no socket; either never connected, logged out, or waiting
///   for an automatic reconnect
/// - Connecting: a socket is being opened
/// - PairingReady: the network issued a pairing code that must be scanned
/// - Connected: paired and exchanging messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    PairingReady,
    Connected,
}

impl ConnectionStatus {
    /// Whether a `connect()` call in this state must be a no-op.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::PairingReady => write!(f, "pairing_ready"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "connecting" => Ok(ConnectionStatus::Connecting),
            "pairing_ready" => Ok(ConnectionStatus::PairingReady),
            "connected" => Ok(ConnectionStatus::Connected),
            other => Err(format!("invalid connection status: '{other}'")),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

/// Public snapshot of a session, as returned by `status()` and pushed to
/// subscribers on every transition.
///
/// `pairing_code` is only ever `Some` while `status` is `PairingReady`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: ConnectionStatus,
    pub pairing_code: Option<String>,
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// A known session and its current status, used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    #[serde(flatten)]
    pub status: SessionStatus,
}
