//! Process-wide session registry.
//!
//! `SessionRegistry` is the only component callers talk to. It lazily
//! creates one slot per `SessionId` and runs every lifecycle operation
//! through it:
//! - `connect` / `logout` are linearized per session by an async operation
//!   lock, so ten concurrent `connect` calls still open one socket
//! - state transitions run under a short synchronous lock; the new snapshot
//!   goes to a `watch` channel and is queued for the `StatusNotifier` before
//!   the lock is released, and callbacks run after it is released
//! - socket events arrive through the `SessionHost` impl, tagged with the
//!   socket generation so events from a replaced socket are ignored
//!
//! The registry owns the reconnect scheduler and the inbound serializer and
//! hands each session slot to the serializer as its reply sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, join_all};
use linkbot_types::config::LinkbotConfig;
use linkbot_types::error::{RepositoryError, SessionError, SocketError};
use linkbot_types::session::{
    ConnectionStatus, CorrespondentId, SessionId, SessionStatus, SessionSummary,
};
use linkbot_types::socket::{CloseReason, Credentials};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::driver::{COMMAND_BUFFER, SessionHost, SocketCommand, SocketDriver, SocketLink};
use super::machine::SessionState;
use super::notifier::{StatusCallback, StatusNotifier, Subscription};
use super::processor::MessageProcessor;
use super::reconnect::ReconnectScheduler;
use super::serializer::{InboundMessageSerializer, ReplySink};
use super::socket::SocketConnector;
use crate::repository::CredentialStore;

/// Tunables of the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Delay before the single automatic reconnect after a transient close.
    pub reconnect_delay: Duration,
    /// How long logout/shutdown wait for a socket to confirm it closed.
    pub shutdown_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&LinkbotConfig> for RegistryConfig {
    fn from(config: &LinkbotConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Session slot
// ---------------------------------------------------------------------------

struct SessionSlot {
    id: SessionId,
    state: Mutex<SessionState>,
    status_tx: watch::Sender<SessionStatus>,
    /// Status deliveries in transition order, drained by one task at a time.
    outbox: Mutex<Outbox>,
    /// Serializes connect/logout/shutdown for this session.
    op_lock: tokio::sync::Mutex<()>,
    /// Bumped by logout and shutdown; a reconnect timer armed before the
    /// bump must not bring the session back.
    epoch: AtomicU64,
}

impl SessionSlot {
    fn new(id: SessionId) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::disconnected());
        Self {
            id,
            state: Mutex::new(SessionState::default()),
            status_tx,
            outbox: Mutex::new(Outbox::default()),
            op_lock: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().expect("session outbox lock poisoned")
    }

    /// Run a transition and publish the new snapshot if it changed.
    ///
    /// The snapshot is queued under the state lock, so deliveries keep
    /// transition order; callbacks run after the lock is released.
    fn apply<R>(&self, notifier: &StatusNotifier, transition: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = {
            let mut state = self.lock();
            let before = state.snapshot();
            let result = transition(&mut state);
            let after = state.snapshot();
            if after != before {
                debug!(session_id = %self.id, status = %after.status, "session status changed");
                self.status_tx.send_replace(after.clone());
                self.enqueue(after, notifier.subscribers(&self.id));
            }
            result
        };
        self.flush(notifier);
        result
    }

    /// Queue a delivery. Callers hold the state lock.
    fn enqueue(&self, status: SessionStatus, targets: Vec<(u64, StatusCallback)>) {
        if !targets.is_empty() {
            self.outbox().queue.push_back(Delivery { status, targets });
        }
    }

    /// Run queued deliveries unless another task is already draining them.
    ///
    /// A callback that subscribes from inside lands here while this task is
    /// draining; its replay is picked up by the running loop.
    fn flush(&self, notifier: &StatusNotifier) {
        {
            let mut outbox = self.outbox();
            if outbox.draining || outbox.queue.is_empty() {
                return;
            }
            outbox.draining = true;
        }
        loop {
            let delivery = {
                let mut outbox = self.outbox();
                match outbox.queue.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            for (sub_id, callback) in &delivery.targets {
                notifier.deliver(&self.id, *sub_id, callback, &delivery.status);
            }
        }
    }

    fn retire(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<Delivery>,
    draining: bool,
}

struct Delivery {
    status: SessionStatus,
    targets: Vec<(u64, StatusCallback)>,
}

impl ReplySink for SessionSlot {
    fn send_reply<'a>(
        &'a self,
        correspondent: &'a CorrespondentId,
        text: String,
    ) -> BoxFuture<'a, Result<(), SessionError>> {
        async move {
            let commands = self
                .lock()
                .link()
                .map(SocketLink::commands)
                .ok_or_else(|| SessionError::NotConnected(self.id.to_string()))?;

            let (ack_tx, ack_rx) = oneshot::channel();
            commands
                .send(SocketCommand::Send {
                    correspondent: correspondent.clone(),
                    text,
                    ack: ack_tx,
                })
                .await
                .map_err(|_| SessionError::NotConnected(self.id.to_string()))?;

            match ack_rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(SocketError::Closed)) | Err(_) => {
                    Err(SessionError::NotConnected(self.id.to_string()))
                }
                Ok(Err(e)) => Err(SessionError::SendFailed(e.to_string())),
            }
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every session's state machine, socket, timers and message queues.
///
/// Cheap to clone; all clones share the same sessions.
pub struct SessionRegistry<C, K, P> {
    inner: Arc<RegistryInner<C, K, P>>,
}

impl<C, K, P> Clone for SessionRegistry<C, K, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RegistryInner<C, K, P> {
    connector: C,
    store: Arc<K>,
    serializer: InboundMessageSerializer<P>,
    reconnect: ReconnectScheduler,
    notifier: Arc<StatusNotifier>,
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    config: RegistryConfig,
    weak_self: Weak<RegistryInner<C, K, P>>,
}

impl<C, K, P> SessionRegistry<C, K, P>
where
    C: SocketConnector,
    K: CredentialStore,
    P: MessageProcessor,
{
    pub fn new(connector: C, store: Arc<K>, processor: Arc<P>, config: RegistryConfig) -> Self {
        let inner = Arc::new_cyclic(|weak_self| RegistryInner {
            connector,
            store,
            serializer: InboundMessageSerializer::new(processor),
            reconnect: ReconnectScheduler::new(config.reconnect_delay),
            notifier: Arc::new(StatusNotifier::new()),
            sessions: DashMap::new(),
            config,
            weak_self: weak_self.clone(),
        });
        Self { inner }
    }

    /// Current status of `id`. Unknown sessions report `disconnected`.
    pub fn status(&self, id: &SessionId) -> SessionStatus {
        self.inner
            .sessions
            .get(id)
            .map(|slot| slot.status_tx.borrow().clone())
            .unwrap_or_default()
    }

    /// Start connecting `id`.
    ///
    /// Returns once the socket has been opened (or failed to open); pairing
    /// and the connection itself complete asynchronously. A no-op while the
    /// session is already connecting, pairing or connected.
    pub async fn connect(&self, id: &SessionId) {
        self.inner.connect(id).await;
    }

    /// Log the session out: unlink the device, delete its credentials,
    /// cancel any pending reconnect and drop its queued messages.
    pub async fn logout(&self, id: &SessionId) {
        self.inner.logout(id).await;
    }

    /// Register `callback` for status updates of `id`.
    ///
    /// The current status is replayed first, then every later change, in
    /// order. Deliveries of one session never overlap. The replay happens
    /// before this returns unless another task is delivering updates of the
    /// session right now (or this is called from inside a callback); then it
    /// runs right after the deliveries already queued.
    ///
    /// Callbacks run outside the session's state lock, so they may read
    /// status or subscribe again. A slow callback still delays later
    /// deliveries of that session.
    pub fn subscribe<F>(&self, id: &SessionId, callback: F) -> Subscription
    where
        F: Fn(&SessionStatus) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        let slot = self.inner.slot(id);
        let notifier = &self.inner.notifier;

        // Registration and replay are queued under the state lock so no
        // transition slips between them.
        let sub_id = {
            let state = slot.lock();
            let sub_id = notifier.add(id, Arc::clone(&callback));
            slot.enqueue(state.snapshot(), vec![(sub_id, callback)]);
            sub_id
        };
        slot.flush(notifier);

        Subscription::new(Arc::clone(notifier), id.clone(), sub_id)
    }

    /// A `watch` receiver that always holds the latest status of `id`.
    pub fn watch(&self, id: &SessionId) -> watch::Receiver<SessionStatus> {
        self.inner.slot(id).status_tx.subscribe()
    }

    /// Every session known to this process, sorted by id.
    pub fn sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .inner
            .sessions
            .iter()
            .map(|entry| SessionSummary {
                id: entry.key().clone(),
                status: entry.value().status_tx.borrow().clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Send a text message through the session's live socket.
    pub async fn send_message(
        &self,
        id: &SessionId,
        correspondent: &CorrespondentId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        let slot = self
            .inner
            .sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotConnected(id.to_string()))?;
        slot.send_reply(correspondent, text.into()).await
    }

    /// Reconnect every session that has stored credentials.
    ///
    /// Returns the number of sessions found in the store.
    pub async fn resume_stored(&self) -> Result<usize, RepositoryError> {
        let ids = self.inner.store.list_ids().await?;
        info!(count = ids.len(), "resuming stored sessions");
        join_all(ids.iter().map(|id| self.inner.connect(id))).await;
        Ok(ids.len())
    }

    /// Close every live socket without logging out or deleting credentials.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.reconnect.cancel_all();
        let slots: Vec<Arc<SessionSlot>> = self
            .inner
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        info!(sessions = slots.len(), cancelled, "shutting down session registry");
        join_all(slots.iter().map(|slot| self.inner.close_slot(slot))).await;
    }

    /// Number of sessions waiting for an automatic reconnect.
    pub fn pending_reconnects(&self) -> usize {
        self.inner.reconnect.pending_count()
    }

    /// Whether an automatic reconnect is armed for `id`.
    pub fn reconnect_pending(&self, id: &SessionId) -> bool {
        self.inner.reconnect.is_pending(id)
    }

    /// Number of conversations with queued or running inbound work.
    pub fn queued_conversations(&self) -> usize {
        self.inner.serializer.pending_len()
    }
}

impl<C, K, P> RegistryInner<C, K, P>
where
    C: SocketConnector,
    K: CredentialStore,
    P: MessageProcessor,
{
    /// Get or lazily create the slot for `id`.
    fn slot(&self, id: &SessionId) -> Arc<SessionSlot> {
        if let Some(slot) = self.sessions.get(id) {
            return Arc::clone(slot.value());
        }
        Arc::clone(
            self.sessions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(SessionSlot::new(id.clone())))
                .value(),
        )
    }

    fn existing(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        self.sessions.get(id).map(|slot| Arc::clone(slot.value()))
    }

    async fn connect(&self, id: &SessionId) {
        let slot = self.slot(id);
        let _op = slot.op_lock.lock().await;
        self.connect_locked(&slot).await;
    }

    /// Connect with the operation lock already held.
    async fn connect_locked(&self, slot: &Arc<SessionSlot>) {
        let id = &slot.id;
        if !slot.apply(&self.notifier, SessionState::begin_connect) {
            debug!(session_id = %id, "connect ignored, session already active");
            return;
        }
        self.reconnect.cancel(id);
        info!(session_id = %id, "connecting session");

        let credentials = match self.store.load(id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(session_id = %id, error = %e, "failed to load credentials");
                let failure = SocketError::Transient(format!("credential store unavailable: {e}"));
                self.open_failed(slot, &failure);
                return;
            }
        };
        debug!(session_id = %id, paired = credentials.is_some(), "opening socket");

        let handle = match self.connector.open(id, credentials).await {
            Ok(handle) => handle,
            Err(e) => {
                self.open_failed(slot, &e);
                return;
            }
        };

        let Some(host) = self.weak_self.upgrade() else {
            // Registry is being dropped; the handle closes with it.
            return;
        };
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let generation = slot.apply(&self.notifier, |state| {
            let generation = state.next_generation();
            state.attach(SocketLink::new(generation, tx));
            generation
        });
        tokio::spawn(SocketDriver::new(id.clone(), generation, handle, rx).run(host));
    }

    fn open_failed(&self, slot: &SessionSlot, failure: &SocketError) {
        let outcome = slot.apply(&self.notifier, |state| state.open_failed(failure));
        if outcome.reconnect {
            warn!(session_id = %slot.id, error = %failure, "socket failed to open, will retry");
            self.schedule_reconnect(slot);
        } else {
            error!(session_id = %slot.id, error = %failure, "socket failed to open");
        }
    }

    fn schedule_reconnect(&self, slot: &SessionSlot) {
        let weak = self.weak_self.clone();
        let id = slot.id.clone();
        let epoch = slot.epoch.load(Ordering::SeqCst);
        self.reconnect.schedule(&slot.id, async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.reconnect_fired(&id, epoch).await;
        });
    }

    async fn reconnect_fired(&self, id: &SessionId, epoch: u64) {
        let Some(slot) = self.existing(id) else {
            return;
        };
        let _op = slot.op_lock.lock().await;
        if slot.epoch.load(Ordering::SeqCst) != epoch {
            debug!(session_id = %id, "session retired since reconnect was scheduled");
            return;
        }
        if slot.lock().status() != ConnectionStatus::Disconnected {
            debug!(session_id = %id, "session no longer disconnected, skipping reconnect");
            return;
        }
        info!(session_id = %id, "reconnecting session");
        self.connect_locked(&slot).await;
    }

    async fn logout(&self, id: &SessionId) {
        let slot = self.slot(id);
        let _op = slot.op_lock.lock().await;
        slot.retire();
        self.reconnect.cancel(id);

        let (_, link) = slot.apply(&self.notifier, |state| self.detach(id, state));
        if let Some(link) = link {
            link.shutdown(true, self.config.shutdown_timeout).await;
        }
        if let Err(e) = self.store.delete(id).await {
            error!(session_id = %id, error = %e, "failed to delete credentials");
        }
        info!(session_id = %id, "session logged out");
    }

    /// Detach the live socket and drop the session's queues in one locked
    /// step, so no inbound message can be queued between the two.
    fn detach(&self, id: &SessionId, state: &mut SessionState) -> (bool, Option<SocketLink>) {
        let detached = state.detach();
        self.serializer.discard_session(id);
        detached
    }

    /// Close the session's socket, keeping its credentials.
    async fn close_slot(&self, slot: &Arc<SessionSlot>) {
        let _op = slot.op_lock.lock().await;
        slot.retire();
        self.reconnect.cancel(&slot.id);

        let (_, link) = slot.apply(&self.notifier, |state| self.detach(&slot.id, state));
        if let Some(link) = link {
            link.shutdown(false, self.config.shutdown_timeout).await;
            debug!(session_id = %slot.id, "socket closed");
        }
    }
}

impl<C, K, P> SessionHost for RegistryInner<C, K, P>
where
    C: SocketConnector,
    K: CredentialStore,
    P: MessageProcessor,
{
    fn on_pairing_code(&self, id: &SessionId, generation: u64, code: String) {
        let Some(slot) = self.existing(id) else {
            return;
        };
        if slot.apply(&self.notifier, |state| state.pairing_code(generation, code)) {
            info!(session_id = %id, "pairing code ready");
        }
    }

    fn on_opened(&self, id: &SessionId, generation: u64) {
        let Some(slot) = self.existing(id) else {
            return;
        };
        if slot.apply(&self.notifier, |state| state.opened(generation)) {
            info!(session_id = %id, "session connected");
        }
    }

    async fn on_credentials(&self, id: &SessionId, generation: u64, credentials: Credentials) {
        let current = self
            .existing(id)
            .is_some_and(|slot| slot.lock().is_current(generation));
        if !current {
            debug!(session_id = %id, generation, "ignoring credentials from a stale socket");
            return;
        }
        match self.store.save(id, &credentials).await {
            Ok(()) => debug!(session_id = %id, bytes = credentials.len(), "credentials saved"),
            Err(e) => error!(session_id = %id, error = %e, "failed to persist credentials"),
        }
    }

    fn on_inbound(&self, id: &SessionId, generation: u64, correspondent: CorrespondentId, text: String) {
        let Some(slot) = self.existing(id) else {
            return;
        };
        // Submitting under the state lock keeps a concurrent detach from
        // discarding the queues between the check and the submit.
        let state = slot.lock();
        if !state.is_current(generation) {
            debug!(session_id = %id, generation, "ignoring message from a stale socket");
            return;
        }
        debug!(session_id = %id, %correspondent, "inbound message");
        self.serializer.submit(id, correspondent, text, Arc::clone(&slot) as Arc<dyn ReplySink>);
        drop(state);
    }

    fn on_closed(&self, id: &SessionId, generation: u64, reason: CloseReason) {
        let Some(slot) = self.existing(id) else {
            return;
        };
        let closed = slot.apply(&self.notifier, |state| {
            let outcome = state.closed(generation, &reason);
            if outcome.is_some() {
                self.serializer.discard_session(id);
            }
            outcome
        });
        let Some(outcome) = closed else {
            debug!(session_id = %id, generation, "ignoring close from a stale socket");
            return;
        };

        if outcome.reconnect {
            warn!(
                session_id = %id,
                %reason,
                delay_secs = self.reconnect.delay().as_secs_f64(),
                "connection closed, reconnecting"
            );
            self.schedule_reconnect(&slot);
        } else {
            info!(session_id = %id, %reason, "connection closed");
        }
    }
}
