//! Shared domain types for Linkbot.
//!
//! This crate contains the types every layer of the session connection
//! manager agrees on: session and correspondent identifiers, connection
//! status snapshots, socket events, credentials, configuration, and the
//! error enums.
//!
//! Zero infrastructure dependencies -- only serde, thiserror, secrecy.

pub mod config;
pub mod error;
pub mod session;
pub mod socket;
