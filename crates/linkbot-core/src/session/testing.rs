//! Hand-written test doubles for the session ports.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use linkbot_types::error::{ProcessError, RepositoryError, SessionError, SocketError};
use linkbot_types::session::{CorrespondentId, SessionId};
use linkbot_types::socket::{Credentials, SocketEvent};
use tokio::sync::mpsc;

use super::processor::MessageProcessor;
use super::serializer::ReplySink;
use super::socket::{SessionSocket, SocketConnector, SocketHandle};
use crate::repository::CredentialStore;

/// Poll `condition` until it holds, failing the test after two seconds.
pub(crate) async fn wait_for(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Credential store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: DashMap<SessionId, Credentials>,
    fail_loads: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn get(&self, id: &SessionId) -> Option<Credentials> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub(crate) fn put(&self, id: &SessionId, credentials: Credentials) {
        self.entries.insert(id.clone(), credentials);
    }

    pub(crate) fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }
}

impl CredentialStore for MemoryStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Credentials>, RepositoryError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        Ok(self.get(id))
    }

    async fn save(&self, id: &SessionId, credentials: &Credentials) -> Result<(), RepositoryError> {
        self.put(id, credentials.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), RepositoryError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>, RepositoryError> {
        let mut ids: Vec<SessionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockSocketState {
    sent: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    logged_out: AtomicBool,
}

pub(crate) struct MockSocket {
    state: Arc<MockSocketState>,
    events: Arc<Mutex<Option<mpsc::Sender<SocketEvent>>>>,
}

impl SessionSocket for MockSocket {
    async fn send(&self, correspondent: &CorrespondentId, text: &str) -> Result<(), SocketError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((correspondent.to_string(), text.to_string()));
        Ok(())
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        // A closed socket stops reporting events.
        self.events.lock().unwrap().take();
    }

    async fn logout(&self) -> Result<(), SocketError> {
        self.state.logged_out.store(true, Ordering::SeqCst);
        self.close().await;
        Ok(())
    }
}

/// The "network side" of one opened mock socket.
#[derive(Clone)]
pub(crate) struct MockRemote {
    pub(crate) session: SessionId,
    pub(crate) credentials: Option<Credentials>,
    state: Arc<MockSocketState>,
    events: Arc<Mutex<Option<mpsc::Sender<SocketEvent>>>>,
}

impl MockRemote {
    /// Report an event to the driver. Silently dropped once the socket closed.
    pub(crate) async fn emit(&self, event: SocketEvent) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Simulate the protocol library vanishing without a close event.
    pub(crate) fn drop_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.state.sent.lock().unwrap().clone()
    }

    pub(crate) fn closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn logged_out(&self) -> bool {
        self.state.logged_out.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockConnectorInner {
    remotes: Mutex<Vec<MockRemote>>,
    failures: Mutex<VecDeque<SocketError>>,
    open_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Connector that opens in-memory sockets and remembers every open.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    inner: Arc<MockConnectorInner>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The next `open` fails with `error` (queued, one per call).
    pub(crate) fn fail_next(&self, error: SocketError) {
        self.inner.failures.lock().unwrap().push_back(error);
    }

    /// Make every `open` take `delay` before returning.
    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.inner.open_delay.lock().unwrap() = Some(delay);
    }

    /// Number of successful opens so far.
    pub(crate) fn open_count(&self) -> usize {
        self.inner.remotes.lock().unwrap().len()
    }

    /// Highest number of opens that were running at the same time.
    pub(crate) fn max_concurrent_opens(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn remote(&self, index: usize) -> MockRemote {
        self.inner.remotes.lock().unwrap()[index].clone()
    }

    pub(crate) fn last_remote(&self) -> MockRemote {
        let remotes = self.inner.remotes.lock().unwrap();
        remotes.last().cloned().expect("no socket opened yet")
    }

    pub(crate) fn remotes_for(&self, id: &SessionId) -> Vec<MockRemote> {
        self.inner
            .remotes
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.session == id)
            .cloned()
            .collect()
    }
}

impl SocketConnector for MockConnector {
    type Socket = MockSocket;

    async fn open(
        &self,
        id: &SessionId,
        credentials: Option<Credentials>,
    ) -> Result<SocketHandle<MockSocket>, SocketError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.inner.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.inner.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(64);
        let state = Arc::new(MockSocketState::default());
        let events = Arc::new(Mutex::new(Some(tx)));
        self.inner.remotes.lock().unwrap().push(MockRemote {
            session: id.clone(),
            credentials,
            state: Arc::clone(&state),
            events: Arc::clone(&events),
        });
        Ok(SocketHandle::new(MockSocket { state, events }, rx))
    }
}

// ---------------------------------------------------------------------------
// Processor and reply sink
// ---------------------------------------------------------------------------

/// Replies `echo: {text}` unless scripted otherwise for a given text.
#[derive(Default)]
pub(crate) struct ScriptedProcessor {
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    silent: HashSet<String>,
    started: Mutex<Vec<String>>,
    finished: AtomicUsize,
}

impl ScriptedProcessor {
    pub(crate) fn echo() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub(crate) fn panicking_on(mut self, text: &str) -> Self {
        self.panicking.insert(text.to_string());
        self
    }

    pub(crate) fn silent_on(mut self, text: &str) -> Self {
        self.silent.insert(text.to_string());
        self
    }

    /// Texts in the order processing started.
    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Calls that got past their scripted delay without being cancelled.
    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl MessageProcessor for ScriptedProcessor {
    async fn process(
        &self,
        _session: &SessionId,
        _correspondent: &CorrespondentId,
        text: &str,
    ) -> Result<Option<String>, ProcessError> {
        self.started.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(text) {
            panic!("processor bug on {text}");
        }
        if self.failing.contains(text) {
            return Err(ProcessError::Failed(format!("cannot handle {text}")));
        }
        if self.silent.contains(text) {
            return Ok(None);
        }
        Ok(Some(format!("echo: {text}")))
    }
}

/// Records replies instead of sending them.
#[derive(Default)]
pub(crate) struct RecordingSink {
    replies: Mutex<Vec<(String, String)>>,
    fail_next: AtomicBool,
}

impl RecordingSink {
    pub(crate) fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|(_, text)| text).collect()
    }

    pub(crate) fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl ReplySink for RecordingSink {
    fn send_reply<'a>(
        &'a self,
        correspondent: &'a CorrespondentId,
        text: String,
    ) -> BoxFuture<'a, Result<(), SessionError>> {
        async move {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(SessionError::SendFailed("socket write failed".to_string()));
            }
            self.replies
                .lock()
                .unwrap()
                .push((correspondent.to_string(), text));
            Ok(())
        }
        .boxed()
    }
}
