//! Per-session status observers.
//!
//! Callers register a callback per session and receive every status
//! snapshot published for that session, in publish order. The registry
//! queues snapshots per session and drains them outside its state lock,
//! one delivery at a time, so transitions are never observed out of order.
//!
//! Callbacks run synchronously on the delivering task and should be quick.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use linkbot_types::session::{SessionId, SessionStatus};
use tracing::{debug, warn};

/// Status observer callback.
pub type StatusCallback = Arc<dyn Fn(&SessionStatus) + Send + Sync>;

/// Registry of status observers keyed by session.
#[derive(Default)]
pub struct StatusNotifier {
    subscribers: DashMap<SessionId, Vec<(u64, StatusCallback)>>,
    next_id: AtomicU64,
}

impl StatusNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `id`. Returns the subscription id.
    pub fn add(&self, id: &SessionId, callback: StatusCallback) -> u64 {
        let sub_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(id.clone())
            .or_default()
            .push((sub_id, callback));
        debug!(session_id = %id, sub_id, "status subscriber added");
        sub_id
    }

    /// Remove one subscription. Returns false when it was already gone.
    pub fn remove(&self, id: &SessionId, sub_id: u64) -> bool {
        let mut removed = false;
        if let Some(mut list) = self.subscribers.get_mut(id) {
            let before = list.len();
            list.retain(|(existing, _)| *existing != sub_id);
            removed = list.len() != before;
        }
        self.subscribers.remove_if(id, |_, list| list.is_empty());
        if removed {
            debug!(session_id = %id, sub_id, "status subscriber removed");
        }
        removed
    }

    /// Deliver `status` to every current subscriber of `id`.
    ///
    /// A panicking callback is logged and does not stop delivery to the
    /// remaining subscribers.
    pub fn publish(&self, id: &SessionId, status: &SessionStatus) {
        for (sub_id, callback) in self.subscribers(id) {
            invoke(id, sub_id, &callback, status);
        }
    }

    /// Current subscribers of `id`, cloned out so no map shard stays locked
    /// while user code runs.
    pub(crate) fn subscribers(&self, id: &SessionId) -> Vec<(u64, StatusCallback)> {
        self.subscribers
            .get(id)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Deliver `status` to one queued target.
    ///
    /// Skipped when the subscription was removed after the delivery was
    /// queued.
    pub(crate) fn deliver(&self, id: &SessionId, sub_id: u64, callback: &StatusCallback, status: &SessionStatus) {
        let subscribed = self
            .subscribers
            .get(id)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == sub_id));
        if subscribed {
            invoke(id, sub_id, callback, status);
        }
    }

    /// Number of subscribers currently registered for `id`.
    pub fn subscriber_count(&self, id: &SessionId) -> usize {
        self.subscribers.get(id).map(|list| list.len()).unwrap_or(0)
    }
}

fn invoke(id: &SessionId, sub_id: u64, callback: &StatusCallback, status: &SessionStatus) {
    if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
        warn!(session_id = %id, sub_id, "status subscriber panicked");
    }
}

impl std::fmt::Debug for StatusNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusNotifier")
            .field("sessions", &self.subscribers.len())
            .finish()
    }
}

/// Handle for one status subscription.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops
/// delivery. Keep it alive for as long as updates are wanted.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    notifier: Arc<StatusNotifier>,
    id: SessionId,
    sub_id: u64,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(notifier: Arc<StatusNotifier>, id: SessionId, sub_id: u64) -> Self {
        Self {
            notifier,
            id,
            sub_id,
            active: true,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// Stop delivery. Calling it more than once is harmless.
    pub fn unsubscribe(&mut self) {
        if self.active {
            self.active = false;
            self.notifier.remove(&self.id, self.sub_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("session_id", &self.id)
            .field("sub_id", &self.sub_id)
            .field("active", &self.active)
            .finish()
    }
}
