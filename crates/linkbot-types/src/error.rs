use thiserror::Error;

/// Caller-facing errors of the session registry and its send capability.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session id: '{0}'")]
    InvalidSessionId(String),

    #[error("correspondent id must not be empty")]
    InvalidCorrespondentId,

    #[error("session {0} has no live socket")]
    NotConnected(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Errors reported by the socket layer.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Worth retrying after the reconnect delay (network, handshake).
    #[error("transient socket failure: {0}")]
    Transient(String),

    /// Retrying will not help (bad configuration, refused account).
    #[error("fatal socket failure: {0}")]
    Fatal(String),

    /// The socket was already closed.
    #[error("socket closed")]
    Closed,
}

impl SocketError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SocketError::Fatal(_))
    }
}

/// Errors from the external message processor.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("processor unavailable: {0}")]
    Unavailable(String),

    #[error("processor rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid processor response: {0}")]
    InvalidResponse(String),

    #[error("processing failed: {0}")]
    Failed(String),
}

/// Errors from repository operations (used by trait definitions in linkbot-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("credential encryption error: {0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::InvalidSessionId("bad id".to_string());
        assert_eq!(err.to_string(), "invalid session id: 'bad id'");
    }

    #[test]
    fn test_socket_error_fatality() {
        assert!(SocketError::Fatal("refused".to_string()).is_fatal());
        assert!(!SocketError::Transient("reset".to_string()).is_fatal());
        assert!(!SocketError::Closed.is_fatal());
    }

    #[test]
    fn test_process_error_display() {
        let err = ProcessError::Rejected {
            status: 503,
            message: "busy".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }
}
