//! Events and payloads exchanged with a session socket.
//!
//! The messaging-protocol library behind a socket reports everything that
//! happens on the wire as a [`SocketEvent`]. The connection manager consumes
//! these from a channel, one socket at a time.

use std::fmt;

use crate::session::CorrespondentId;

/// Opaque pairing credential blob (auth secrets plus rotating key material).
///
/// The core never looks inside; encoding is owned by the socket layer and
/// the credential store. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(Vec<u8>);

impl Credentials {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials({} bytes)", self.0.len())
    }
}

/// Why a socket closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The network confirmed the device was logged out. Clean terminal state.
    LoggedOut,
    /// The account was banned or otherwise permanently refused.
    Banned(String),
    /// The network rejected the stored session as unusable.
    BadSession(String),
    /// Network drop, reset, or unexpected EOF.
    ConnectionLost,
    /// Handshake or keep-alive timed out.
    TimedOut,
    /// The server asked the client to restart the connection.
    RestartRequired,
    /// Another connection for the same account replaced this one.
    Replaced,
    /// Any other close the protocol layer could not classify.
    Other(String),
}

/// What the state machine must do after a close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Terminal, no error surfaced.
    Terminal,
    /// Terminal, the message is surfaced as `last_error`.
    Fatal(String),
    /// Transient, schedule one automatic reconnect.
    Retry,
}

impl CloseReason {
    /// Classify the close into the reconnect policy.
    pub fn disposition(&self) -> CloseDisposition {
        match self {
            CloseReason::LoggedOut => CloseDisposition::Terminal,
            CloseReason::Banned(msg) => {
                CloseDisposition::Fatal(format!("account banned by the network: {msg}"))
            }
            CloseReason::BadSession(msg) => {
                CloseDisposition::Fatal(format!("stored session rejected: {msg}"))
            }
            CloseReason::ConnectionLost
            | CloseReason::TimedOut
            | CloseReason::RestartRequired
            | CloseReason::Replaced
            | CloseReason::Other(_) => CloseDisposition::Retry,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::LoggedOut => write!(f, "logged out"),
            CloseReason::Banned(msg) => write!(f, "banned: {msg}"),
            CloseReason::BadSession(msg) => write!(f, "bad session: {msg}"),
            CloseReason::ConnectionLost => write!(f, "connection lost"),
            CloseReason::TimedOut => write!(f, "timed out"),
            CloseReason::RestartRequired => write!(f, "restart required"),
            CloseReason::Replaced => write!(f, "connection replaced"),
            CloseReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// One event reported by a session socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A new pairing code is ready to be rendered as a scannable image.
    PairingCode(String),
    /// Pairing confirmed (or stored credentials accepted); the session is live.
    Opened,
    /// Key material rotated; the blob must be persisted.
    CredentialsUpdated(Credentials),
    /// A text message from a correspondent.
    Inbound {
        correspondent: CorrespondentId,
        text: String,
    },
    /// The socket closed. No further events follow.
    Closed(CloseReason),
}
