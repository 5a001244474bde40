//! Session socket port.
//!
//! The end-to-end-encrypted wire protocol lives outside this crate. A
//! `SocketConnector` opens one `SessionSocket` per session and hands back the
//! receiving half of an event channel; the connection manager reads
//! [`SocketEvent`]s from it until `Closed` arrives or the channel drops.

use linkbot_types::error::SocketError;
use linkbot_types::session::{CorrespondentId, SessionId};
use linkbot_types::socket::{Credentials, SocketEvent};
use tokio::sync::mpsc;

/// A live network handle for one session.
///
/// Exclusively owned by the session's driver task; nothing else holds it.
pub trait SessionSocket: Send + Sync + 'static {
    /// Send a text message to a correspondent.
    fn send(
        &self,
        correspondent: &CorrespondentId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), SocketError>> + Send;

    /// Close the connection, keeping the device paired.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Ask the network to unlink this device, then close.
    fn logout(&self) -> impl std::future::Future<Output = Result<(), SocketError>> + Send;
}

/// An opened socket plus the stream of events it will report.
pub struct SocketHandle<S> {
    pub socket: S,
    pub events: mpsc::Receiver<SocketEvent>,
}

impl<S> SocketHandle<S> {
    pub fn new(socket: S, events: mpsc::Receiver<SocketEvent>) -> Self {
        Self { socket, events }
    }
}

/// Factory for session sockets.
pub trait SocketConnector: Send + Sync + 'static {
    type Socket: SessionSocket;

    /// Open a socket for `id`, seeded with stored credentials when the
    /// session paired before. Without credentials the socket starts a new
    /// pairing and reports a `PairingCode` event.
    fn open(
        &self,
        id: &SessionId,
        credentials: Option<Credentials>,
    ) -> impl std::future::Future<Output = Result<SocketHandle<Self::Socket>, SocketError>> + Send;
}
