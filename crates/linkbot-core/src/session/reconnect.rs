//! Delayed reconnect timers.
//!
//! After a transient close the registry schedules exactly one reconnect
//! attempt per session after a fixed delay. While a timer is pending for a
//! session, further schedule requests for it are no-ops. Timers are
//! cancellable (explicit connect, logout, shutdown).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use linkbot_types::session::SessionId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
struct PendingReconnect {
    ticket: u64,
    cancel: CancellationToken,
}

/// At most one pending reconnect timer per session.
#[derive(Debug)]
pub struct ReconnectScheduler {
    delay: Duration,
    pending: Arc<DashMap<SessionId, PendingReconnect>>,
    next_ticket: AtomicU64,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(DashMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `fire` for `id` once the delay elapses.
    ///
    /// Returns false without scheduling anything when a timer for `id` is
    /// already pending. The pending entry is cleared before `fire` runs, so
    /// `fire` may itself lead to a new schedule.
    pub fn schedule<F>(&self, id: &SessionId, fire: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        match self.pending.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!(session_id = %id, "reconnect already pending");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingReconnect {
                    ticket,
                    cancel: cancel.clone(),
                });
            }
        }

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        let id = id.clone();
        info!(session_id = %id, delay_secs = delay.as_secs_f64(), "reconnect scheduled");

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %id, "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            // Only clear our own entry; a cancel + reschedule may have replaced it.
            let removed = pending.remove_if(&id, |_, entry| entry.ticket == ticket);
            if removed.is_none() {
                return;
            }
            debug!(session_id = %id, "reconnect timer fired");
            fire.await;
        });
        true
    }

    /// Cancel the pending timer for `id`. Returns whether one existed.
    pub fn cancel(&self, id: &SessionId) -> bool {
        match self.pending.remove(id) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                debug!(session_id = %id, "pending reconnect cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<SessionId> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn is_pending(&self, id: &SessionId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        assert!(scheduler.schedule(&sid("a"), make()));
        assert!(scheduler.is_pending(&sid("a")));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&sid("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn second_schedule_is_noop_while_pending() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        assert!(scheduler.schedule(&sid("a"), make()));
        assert!(!scheduler.schedule(&sid("a"), make()));
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_independent() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        assert!(scheduler.schedule(&sid("a"), make()));
        assert!(scheduler.schedule(&sid("b"), make()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        scheduler.schedule(&sid("a"), make());
        assert!(scheduler.cancel(&sid("a")));
        assert!(!scheduler.cancel(&sid("a")));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_after_cancel_fires_only_new_timer() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        scheduler.schedule(&sid("a"), make());
        tokio::time::sleep(Duration::from_secs(3)).await;
        scheduler.cancel(&sid("a"));
        assert!(scheduler.schedule(&sid("a"), make()));

        // Old timer's deadline passes without firing.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending(&sid("a")));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_everything() {
        let scheduler = ReconnectScheduler::new(Duration::from_secs(5));
        let (count, make) = counter();

        scheduler.schedule(&sid("a"), make());
        scheduler.schedule(&sid("b"), make());
        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_may_reschedule() {
        let scheduler = Arc::new(ReconnectScheduler::new(Duration::from_secs(5)));
        let count = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = Arc::clone(&scheduler);
        let inner_count = Arc::clone(&count);
        scheduler.schedule(&sid("a"), async move {
            inner_count.fetch_add(1, Ordering::SeqCst);
            let again = Arc::clone(&inner_count);
            assert!(inner_scheduler.schedule(&sid("a"), async move {
                again.fetch_add(1, Ordering::SeqCst);
            }));
        });

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
