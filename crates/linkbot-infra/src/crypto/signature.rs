//! HMAC-SHA256 signatures for webhook payloads.
//!
//! Outbound reply requests are signed over `{timestamp}.{body}`; inbound
//! gateway events are verified the same way, in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::cipher::{hex_decode, hex_encode};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "X-Linkbot-Signature";

/// Header carrying the unix timestamp (seconds) the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Linkbot-Timestamp";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("HMAC signature verification failed")]
    Mismatch,

    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),
}

fn mac_for(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Sign `{timestamp}.{body}` and return the lowercase hex digest.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

/// Verify a hex signature over `{timestamp}.{body}`.
///
/// Accepts an optional `sha256=` prefix on the signature.
pub fn verify(secret: &[u8], timestamp: &str, body: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
    let hex = signature_hex.strip_prefix("sha256=").unwrap_or(signature_hex);
    let expected = hex_decode(hex).map_err(|_| SignatureError::Mismatch)?;
    mac_for(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
