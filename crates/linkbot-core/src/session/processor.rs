//! Message processor trait for reply generation.
//!
//! The surrounding application (retrieval + agent pipeline) decides what a
//! chatbot answers; the connection manager only hands it inbound text and
//! sends back whatever it returns.

use linkbot_types::error::ProcessError;
use linkbot_types::session::{CorrespondentId, SessionId};

/// Trait for turning one inbound message into an optional reply.
pub trait MessageProcessor: Send + Sync + 'static {
    /// Process an inbound message.
    ///
    /// Returns `Some(reply)` to answer the correspondent, or `None` if the
    /// message is consumed silently (e.g. the chatbot behind the session is
    /// disabled). May be slow; it never blocks other correspondents.
    fn process(
        &self,
        session: &SessionId,
        correspondent: &CorrespondentId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, ProcessError>> + Send;
}
