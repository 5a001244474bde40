//! Cryptographic operations for Linkbot.
//!
//! - `cipher`: AES-256-GCM encryption for credential blobs at rest
//! - `signature`: HMAC-SHA256 signing and verification of webhook payloads

pub mod cipher;
pub mod signature;
