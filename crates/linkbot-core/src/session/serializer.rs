//! Per-conversation inbound message ordering.
//!
//! Every `(session, correspondent)` pair gets a chain: a shared future of the
//! most recently scheduled task. A new message spawns a task that first
//! awaits the previous tail, so messages from one correspondent are
//! processed and answered strictly in arrival order while different
//! correspondents (and sessions) run in parallel.
//!
//! When a task finishes and is still the tail of its chain, it removes the
//! chain entry, so idle conversations leave nothing behind.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use linkbot_types::error::SessionError;
use linkbot_types::session::{CorrespondentId, SessionId};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::processor::MessageProcessor;

/// Where replies for a session are sent.
///
/// Implemented by the registry's per-session slot. Must tolerate the socket
/// being gone by returning an error rather than panicking.
pub trait ReplySink: Send + Sync + 'static {
    fn send_reply<'a>(
        &'a self,
        correspondent: &'a CorrespondentId,
        text: String,
    ) -> BoxFuture<'a, Result<(), SessionError>>;
}

/// Key of one conversation chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub session: SessionId,
    pub correspondent: CorrespondentId,
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session, self.correspondent)
    }
}

type Tail = Shared<BoxFuture<'static, ()>>;

struct ChainLink {
    ticket: u64,
    tail: Tail,
}

/// Serializes message processing per `(session, correspondent)`.
pub struct InboundMessageSerializer<P> {
    processor: Arc<P>,
    chains: Arc<DashMap<QueueKey, ChainLink>>,
    sessions: DashMap<SessionId, CancellationToken>,
    next_ticket: AtomicU64,
}

impl<P: MessageProcessor> InboundMessageSerializer<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            processor,
            chains: Arc::new(DashMap::new()),
            sessions: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Queue an inbound message behind earlier messages of the same
    /// correspondent. Replies go to `sink`.
    ///
    /// Returns false when the message carries no text and was dropped.
    pub fn submit(
        &self,
        session: &SessionId,
        correspondent: CorrespondentId,
        text: String,
        sink: Arc<dyn ReplySink>,
    ) -> bool {
        if text.trim().is_empty() {
            debug!(session_id = %session, %correspondent, "ignoring inbound message without text");
            return false;
        }

        let token = self
            .sessions
            .entry(session.clone())
            .or_insert_with(CancellationToken::new)
            .clone();
        let key = QueueKey {
            session: session.clone(),
            correspondent,
        };
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let tail: Tail = async move {
            let _ = done_rx.await;
        }
        .boxed()
        .shared();

        let previous = match self.chains.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().tail.clone();
                entry.insert(ChainLink { ticket, tail });
                Some(previous)
            }
            Entry::Vacant(entry) => {
                entry.insert(ChainLink { ticket, tail });
                None
            }
        };

        let processor = Arc::clone(&self.processor);
        let chains = Arc::clone(&self.chains);
        tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }

            let step = deliver(processor.as_ref(), &key, text, sink.as_ref(), &token);
            if AssertUnwindSafe(step).catch_unwind().await.is_err() {
                warn!(queue = %key, "message processing panicked");
            }

            chains.remove_if(&key, |_, link| link.ticket == ticket);
            let _ = done_tx.send(());
        });
        true
    }

    /// Drop every chain of `session`.
    ///
    /// Tasks already queued are not awaited; the ones that have not yet
    /// produced a reply skip processing and sending. Later submissions for the
    /// session start fresh chains.
    pub fn discard_session(&self, session: &SessionId) {
        if let Some((_, token)) = self.sessions.remove(session) {
            token.cancel();
        }
        let before = self.chains.len();
        self.chains.retain(|key, _| &key.session != session);
        let dropped = before.saturating_sub(self.chains.len());
        if dropped > 0 {
            debug!(session_id = %session, dropped, "discarded message queues");
        }
    }

    /// Number of conversations with queued or running work.
    pub fn pending_len(&self) -> usize {
        self.chains.len()
    }

    #[cfg(test)]
    pub(crate) fn tracks_session(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }
}

impl<P> fmt::Debug for InboundMessageSerializer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessageSerializer")
            .field("pending", &self.chains.len())
            .finish()
    }
}

async fn deliver<P: MessageProcessor>(
    processor: &P,
    key: &QueueKey,
    text: String,
    sink: &dyn ReplySink,
    token: &CancellationToken,
) {
    if token.is_cancelled() {
        debug!(queue = %key, "queue discarded, skipping message");
        return;
    }

    let result = tokio::select! {
        _ = token.cancelled() => {
            debug!(queue = %key, "queue discarded during processing");
            return;
        }
        result = processor.process(&key.session, &key.correspondent, &text) => result,
    };

    let reply = match result {
        Ok(Some(reply)) if !reply.trim().is_empty() => reply,
        Ok(_) => {
            debug!(queue = %key, "processor produced no reply");
            return;
        }
        Err(e) => {
            warn!(queue = %key, error = %e, "message processing failed");
            return;
        }
    };

    if token.is_cancelled() {
        return;
    }
    if let Err(e) = sink.send_reply(&key.correspondent, reply).await {
        warn!(queue = %key, error = %e, "failed to send reply");
    }
}
