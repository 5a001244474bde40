//! Connection state machine for a single session.
//!
//! `SessionState` holds the public status fields plus the link to the
//! session's socket driver. Transitions are plain synchronous methods that
//! report whether anything observable changed; the registry runs them under
//! the session's state lock and publishes the resulting snapshot.
//!
//! ```text
//! disconnected --connect--> connecting --pairing code--> pairing_ready
//!                               |                            |
//!                               +---------opened-------------+--> connected
//! connecting | pairing_ready | connected --closed--> disconnected
//! ```
//!
//! Every event carries the generation of the socket that produced it. Once a
//! socket's link is gone (closed, logged out, replaced) its late events are
//! stale and ignored.

use linkbot_types::error::SocketError;
use linkbot_types::session::{ConnectionStatus, SessionStatus};
use linkbot_types::socket::{CloseDisposition, CloseReason};

use super::driver::SocketLink;

/// What the registry must do after a socket went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CloseOutcome {
    pub(crate) reconnect: bool,
}

/// Mutable state of one session.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    status: ConnectionStatus,
    pairing_code: Option<String>,
    last_error: Option<String>,
    link: Option<SocketLink>,
    generation: u64,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            status: self.status,
            pairing_code: self.pairing_code.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn link(&self) -> Option<&SocketLink> {
        self.link.as_ref()
    }

    /// Whether `generation` is the socket currently linked to this session.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// `disconnected --connect--> connecting`.
    ///
    /// Returns false (no-op) when the session is already active or a socket
    /// link exists.
    pub(crate) fn begin_connect(&mut self) -> bool {
        if self.status.is_active() || self.link.is_some() {
            return false;
        }
        self.status = ConnectionStatus::Connecting;
        self.pairing_code = None;
        self.last_error = None;
        true
    }

    /// Reserve the next socket generation for a socket about to be linked.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Link a freshly opened socket. The status stays `connecting` until the
    /// socket reports a pairing code or an open connection.
    pub(crate) fn attach(&mut self, link: SocketLink) {
        debug_assert!(self.link.is_none(), "a session owns at most one socket");
        self.link = Some(link);
    }

    /// `connecting --pairing code--> pairing_ready`. A refreshed code while
    /// already pairing replaces the previous one.
    pub(crate) fn pairing_code(&mut self, generation: u64, code: String) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::PairingReady => {
                self.status = ConnectionStatus::PairingReady;
                self.pairing_code = Some(code);
                self.last_error = None;
                true
            }
            ConnectionStatus::Connected | ConnectionStatus::Disconnected => false,
        }
    }

    /// `connecting | pairing_ready --opened--> connected`.
    pub(crate) fn opened(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.status == ConnectionStatus::Connected {
            return false;
        }
        self.status = ConnectionStatus::Connected;
        self.pairing_code = None;
        self.last_error = None;
        true
    }

    /// `* --closed--> disconnected`. Returns None for a stale generation.
    pub(crate) fn closed(&mut self, generation: u64, reason: &CloseReason) -> Option<CloseOutcome> {
        if !self.is_current(generation) {
            return None;
        }
        self.link = None;
        self.status = ConnectionStatus::Disconnected;
        self.pairing_code = None;

        let reconnect = match reason.disposition() {
            CloseDisposition::Terminal => {
                self.last_error = None;
                false
            }
            CloseDisposition::Fatal(message) => {
                self.last_error = Some(message);
                false
            }
            CloseDisposition::Retry => {
                self.last_error = None;
                true
            }
        };
        Some(CloseOutcome { reconnect })
    }

    /// The socket could not be opened (or credentials could not be loaded).
    ///
    /// Fatal errors surface as `last_error` and stop; anything else is
    /// treated like a transient close and retried.
    pub(crate) fn open_failed(&mut self, error: &SocketError) -> CloseOutcome {
        self.link = None;
        self.status = ConnectionStatus::Disconnected;
        self.pairing_code = None;
        if error.is_fatal() {
            self.last_error = Some(error.to_string());
            CloseOutcome { reconnect: false }
        } else {
            self.last_error = None;
            CloseOutcome { reconnect: true }
        }
    }

    /// Explicit logout (or process shutdown): detach the link and settle in a
    /// clean `disconnected` state.
    ///
    /// Returns whether the snapshot changed, and the detached link if any.
    pub(crate) fn detach(&mut self) -> (bool, Option<SocketLink>) {
        let before = self.snapshot();
        let link = self.link.take();
        self.status = ConnectionStatus::Disconnected;
        self.pairing_code = None;
        self.last_error = None;
        (self.snapshot() != before, link)
    }
}
