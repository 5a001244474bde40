//! Infrastructure layer for Linkbot.
//!
//! Contains implementations of the ports defined in `linkbot-core`:
//! SQLite and in-memory credential stores, the HTTP protocol-gateway socket
//! connector, the reply webhook processor, plus configuration loading and
//! cryptographic helpers (AES-256-GCM at rest, HMAC-SHA256 signatures).

pub mod config;
pub mod crypto;
pub mod gateway;
pub mod memory;
pub mod processor;
pub mod sqlite;
