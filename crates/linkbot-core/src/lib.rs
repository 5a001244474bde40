//! Session connection manager and port trait definitions for Linkbot.
//!
//! This crate owns the lifecycle of every messaging-network session:
//! connect, pairing, reconnect and logout, plus the per-correspondent inbound
//! message serialization. It defines the "ports" (credential store, session
//! socket, message processor) that `linkbot-infra` implements and depends
//! only on `linkbot-types` -- never on `linkbot-infra` or any database/IO crate.

pub mod repository;
pub mod session;
