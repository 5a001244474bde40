//! Per-socket event loop.
//!
//! A `SocketDriver` is spawned for every opened socket and owns it for the
//! socket's whole life. It multiplexes two inputs:
//! - socket events (pairing code, opened, credential rotation, inbound
//!   message, closed), forwarded to a [`SessionHost`] in arrival order
//! - commands from the registry (send a reply, shut down), delivered over
//!   the `SocketLink` channel stored in the session state
//!
//! When the registry drops the link the command channel closes and the
//! driver closes the socket, so a socket can never outlive its link.

use std::time::Duration;

use linkbot_types::error::SocketError;
use linkbot_types::session::{CorrespondentId, SessionId};
use linkbot_types::socket::{CloseReason, Credentials, SocketEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::socket::{SessionSocket, SocketHandle};

/// Buffer size for queued commands (mostly outbound replies) per socket.
pub(crate) const COMMAND_BUFFER: usize = 64;

/// Commands the registry sends to a driver.
#[derive(Debug)]
pub(crate) enum SocketCommand {
    Send {
        correspondent: CorrespondentId,
        text: String,
        ack: oneshot::Sender<Result<(), SocketError>>,
    },
    Shutdown {
        logout: bool,
        ack: oneshot::Sender<()>,
    },
}

/// The registry's handle on a running driver.
///
/// Stored in the session state; exactly one exists per live socket.
#[derive(Debug)]
pub(crate) struct SocketLink {
    pub(crate) generation: u64,
    commands: mpsc::Sender<SocketCommand>,
}

impl SocketLink {
    pub(crate) fn new(generation: u64, commands: mpsc::Sender<SocketCommand>) -> Self {
        Self {
            generation,
            commands,
        }
    }

    /// A cloneable sender for the send capability.
    pub(crate) fn commands(&self) -> mpsc::Sender<SocketCommand> {
        self.commands.clone()
    }

    /// Ask the driver to close (or log out) its socket and wait for it,
    /// bounded by `timeout`. Consumes the link.
    pub(crate) async fn shutdown(self, logout: bool, timeout: Duration) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .commands
            .send(SocketCommand::Shutdown { logout, ack: ack_tx })
            .await
            .is_err()
        {
            debug!(generation = self.generation, "driver already stopped");
            return;
        }
        if tokio::time::timeout(timeout, ack_rx).await.is_err() {
            warn!(
                generation = self.generation,
                ?timeout,
                "socket did not acknowledge shutdown in time"
            );
        }
    }
}

/// Receiver of socket events, implemented by the registry.
///
/// Every method is tagged with the socket generation so the host can ignore
/// events from a socket it has already replaced or torn down.
pub trait SessionHost: Send + Sync + 'static {
    fn on_pairing_code(&self, id: &SessionId, generation: u64, code: String);

    fn on_opened(&self, id: &SessionId, generation: u64);

    fn on_credentials(
        &self,
        id: &SessionId,
        generation: u64,
        credentials: Credentials,
    ) -> impl std::future::Future<Output = ()> + Send;

    fn on_inbound(&self, id: &SessionId, generation: u64, correspondent: CorrespondentId, text: String);

    fn on_closed(&self, id: &SessionId, generation: u64, reason: CloseReason);
}

/// Event loop for one socket.
pub(crate) struct SocketDriver<S> {
    id: SessionId,
    generation: u64,
    socket: S,
    events: mpsc::Receiver<SocketEvent>,
    commands: mpsc::Receiver<SocketCommand>,
}

impl<S: SessionSocket> SocketDriver<S> {
    pub(crate) fn new(
        id: SessionId,
        generation: u64,
        handle: SocketHandle<S>,
        commands: mpsc::Receiver<SocketCommand>,
    ) -> Self {
        Self {
            id,
            generation,
            socket: handle.socket,
            events: handle.events,
            commands,
        }
    }

    /// Run until the socket closes or the registry shuts it down.
    pub(crate) async fn run<H: SessionHost>(mut self, host: std::sync::Arc<H>) {
        let id = self.id.clone();
        let generation = self.generation;
        debug!(session_id = %id, generation, "socket driver started");

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(SocketCommand::Send { correspondent, text, ack }) => {
                        let result = self.socket.send(&correspondent, &text).await;
                        let _ = ack.send(result);
                    }
                    Some(SocketCommand::Shutdown { logout, ack }) => {
                        if logout {
                            if let Err(e) = self.socket.logout().await {
                                warn!(session_id = %id, error = %e, "network logout failed, closing anyway");
                                self.socket.close().await;
                            }
                        } else {
                            self.socket.close().await;
                        }
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        // Link dropped by the registry without an explicit shutdown.
                        self.socket.close().await;
                        break;
                    }
                },

                event = self.events.recv() => match event {
                    Some(SocketEvent::PairingCode(code)) => host.on_pairing_code(&id, generation, code),
                    Some(SocketEvent::Opened) => host.on_opened(&id, generation),
                    Some(SocketEvent::CredentialsUpdated(credentials)) => {
                        host.on_credentials(&id, generation, credentials).await;
                    }
                    Some(SocketEvent::Inbound { correspondent, text }) => {
                        host.on_inbound(&id, generation, correspondent, text);
                    }
                    Some(SocketEvent::Closed(reason)) => {
                        host.on_closed(&id, generation, reason);
                        break;
                    }
                    None => {
                        host.on_closed(&id, generation, CloseReason::ConnectionLost);
                        break;
                    }
                },
            }
        }

        // Anyone still waiting on a reply learns the socket is gone.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SocketCommand::Send { ack, .. } => {
                    let _ = ack.send(Err(SocketError::Closed));
                }
                SocketCommand::Shutdown { ack, .. } => {
                    let _ = ack.send(());
                }
            }
        }
        debug!(session_id = %id, generation, "socket driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{MockConnector, wait_for};
    use crate::session::socket::SocketConnector;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SessionHost for RecordingHost {
        fn on_pairing_code(&self, _id: &SessionId, generation: u64, code: String) {
            self.calls.lock().unwrap().push(format!("pairing:{generation}:{code}"));
        }

        fn on_opened(&self, _id: &SessionId, generation: u64) {
            self.calls.lock().unwrap().push(format!("opened:{generation}"));
        }

        async fn on_credentials(&self, _id: &SessionId, generation: u64, credentials: Credentials) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("creds:{generation}:{}", credentials.len()));
        }

        fn on_inbound(&self, _id: &SessionId, _generation: u64, correspondent: CorrespondentId, text: String) {
            self.calls.lock().unwrap().push(format!("inbound:{correspondent}:{text}"));
        }

        fn on_closed(&self, _id: &SessionId, generation: u64, reason: CloseReason) {
            self.calls.lock().unwrap().push(format!("closed:{generation}:{reason}"));
        }
    }

    async fn spawn_driver(
        connector: &MockConnector,
        host: Arc<RecordingHost>,
    ) -> (mpsc::Sender<SocketCommand>, tokio::task::JoinHandle<()>) {
        let id = SessionId::parse("s1").unwrap();
        let handle = connector.open(&id, None).await.unwrap();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let driver = SocketDriver::new(id, 7, handle, rx);
        (tx, tokio::spawn(driver.run(host)))
    }

    #[tokio::test]
    async fn forwards_events_in_order() {
        let connector = MockConnector::new();
        let host = Arc::new(RecordingHost::default());
        let (_tx, join) = spawn_driver(&connector, Arc::clone(&host)).await;
        let remote = connector.remote(0);

        remote.emit(SocketEvent::PairingCode("2@abc".to_string())).await;
        remote.emit(SocketEvent::CredentialsUpdated(Credentials::new(vec![1, 2, 3]))).await;
        remote.emit(SocketEvent::Opened).await;
        remote
            .emit(SocketEvent::Inbound {
                correspondent: CorrespondentId::new("c1"),
                text: "Hi".to_string(),
            })
            .await;
        remote.emit(SocketEvent::Closed(CloseReason::TimedOut)).await;

        join.await.unwrap();
        assert_eq!(
            host.calls(),
            vec![
                "pairing:7:2@abc",
                "creds:7:3",
                "opened:7",
                "inbound:c1:Hi",
                "closed:7:timed out",
            ]
        );
    }

    #[tokio::test]
    async fn dropped_event_channel_reports_connection_lost() {
        let connector = MockConnector::new();
        let host = Arc::new(RecordingHost::default());
        let (_tx, join) = spawn_driver(&connector, Arc::clone(&host)).await;

        connector.remote(0).drop_events();
        join.await.unwrap();
        assert_eq!(host.calls(), vec!["closed:7:connection lost"]);
    }

    #[tokio::test]
    async fn send_command_reaches_socket() {
        let connector = MockConnector::new();
        let host = Arc::new(RecordingHost::default());
        let (tx, _join) = spawn_driver(&connector, host).await;

        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send(SocketCommand::Send {
            correspondent: CorrespondentId::new("c1"),
            text: "hello".to_string(),
            ack: ack_tx,
        })
        .await
        .unwrap();

        ack_rx.await.unwrap().unwrap();
        assert_eq!(connector.remote(0).sent(), vec![("c1".to_string(), "hello".to_string())]);
    }

    #[tokio::test]
    async fn shutdown_with_logout_unlinks_device() {
        let connector = MockConnector::new();
        let host = Arc::new(RecordingHost::default());
        let (tx, join) = spawn_driver(&connector, Arc::clone(&host)).await;

        SocketLink::new(7, tx).shutdown(true, Duration::from_secs(1)).await;
        join.await.unwrap();

        let remote = connector.remote(0);
        assert!(remote.logged_out());
        // Shutdown is registry-initiated, so the host is not told about a close.
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn dropping_link_closes_socket() {
        let connector = MockConnector::new();
        let host = Arc::new(RecordingHost::default());
        let (tx, join) = spawn_driver(&connector, host).await;

        drop(tx);
        join.await.unwrap();
        let remote = connector.remote(0);
        wait_for(|| remote.closed()).await;
        assert!(!remote.logged_out());
    }
}
