//! Session connection manager.
//!
//! This module keeps many independent messaging-network sessions alive:
//! - `registry` -- `SessionRegistry`, the only entry point for callers
//! - `machine` -- pure connection state transitions
//! - `driver` -- per-socket event loop owning the socket handle
//! - `reconnect` -- `ReconnectScheduler`, one delayed retry per session
//! - `notifier` -- `StatusNotifier`, per-session status observers
//! - `serializer` -- `InboundMessageSerializer`, per-correspondent FIFO chains
//! - `socket` / `processor` -- ports for the protocol library and reply generation

pub mod driver;
pub mod machine;
pub mod notifier;
pub mod processor;
pub mod reconnect;
pub mod registry;
pub mod serializer;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use notifier::{StatusNotifier, Subscription};
pub use processor::MessageProcessor;
pub use reconnect::ReconnectScheduler;
pub use registry::{RegistryConfig, SessionRegistry};
pub use serializer::{InboundMessageSerializer, QueueKey, ReplySink};
pub use socket::{SessionSocket, SocketConnector, SocketHandle};
