//! Configuration types for Linkbot.
//!
//! `LinkbotConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default so an empty or missing file yields a
//! working (if unconnected) manager.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkbotConfig {
    /// Fixed delay before the single automatic reconnect after a transient close.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Reconnect every session with stored credentials when the server starts.
    #[serde(default = "default_resume_on_start")]
    pub resume_on_start: bool,

    /// Where inbound messages are sent to obtain a reply.
    #[serde(default)]
    pub processor: Option<ProcessorConfig>,

    /// The protocol gateway that hosts the actual network sockets.
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_resume_on_start() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl LinkbotConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for LinkbotConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
            resume_on_start: default_resume_on_start(),
            processor: None,
            gateway: None,
        }
    }
}

/// Reply-generation webhook settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Endpoint receiving `{session_id, correspondent_id, text}`.
    pub url: String,
    /// Shared secret for the `X-Linkbot-Signature` HMAC header.
    #[serde(default)]
    pub secret: Option<SecretString>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Protocol gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway API.
    pub url: String,
    /// Bearer token presented to the gateway.
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Secret the gateway uses to sign the events it posts back.
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}
