//! Routes gateway events to the socket that is currently open for a session.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use linkbot_types::session::SessionId;
use linkbot_types::socket::SocketEvent;
use tokio::sync::mpsc;
use tracing::debug;

use super::{GatewayError, GatewayEvent};

/// Per-socket event buffer.
const EVENT_BUFFER: usize = 64;

struct Route {
    id: u64,
    tx: mpsc::Sender<SocketEvent>,
}

/// Event router shared by the connector and the HTTP ingress.
///
/// Each open socket owns one route. Opening a new socket for a session
/// replaces the old route, so late events from a superseded socket are
/// never delivered to its successor.
#[derive(Default)]
pub struct GatewayInbox {
    routes: DashMap<SessionId, Route>,
    next_route: AtomicU64,
}

impl GatewayInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open_route(&self, id: &SessionId) -> (u64, mpsc::Receiver<SocketEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let route = self.next_route.fetch_add(1, Ordering::Relaxed);
        self.routes.insert(id.clone(), Route { id: route, tx });
        (route, rx)
    }

    /// Drop the route if it still belongs to `route`. The socket's event
    /// channel closes once the sender is gone.
    pub(crate) fn close_route(&self, id: &SessionId, route: u64) {
        self.routes.remove_if(id, |_, r| r.id == route);
    }

    /// Deliver one gateway event.
    ///
    /// Returns `Ok(false)` when the event carries nothing the manager acts
    /// on. A `closed` event also removes the route.
    pub async fn dispatch(&self, id: &SessionId, event: GatewayEvent) -> Result<bool, GatewayError> {
        let Some(event) = event.into_socket_event()? else {
            debug!(session_id = %id, "ignoring gateway event without text");
            return Ok(false);
        };

        let (route, tx) = self
            .routes
            .get(id)
            .map(|r| (r.id, r.tx.clone()))
            .ok_or_else(|| GatewayError::UnknownSession(id.to_string()))?;

        let closing = matches!(event, SocketEvent::Closed(_));
        tx.send(event)
            .await
            .map_err(|_| GatewayError::Closed(id.to_string()))?;
        if closing {
            self.close_route(id, route);
        }
        Ok(true)
    }

    pub fn open_routes(&self) -> usize {
        self.routes.len()
    }
}
