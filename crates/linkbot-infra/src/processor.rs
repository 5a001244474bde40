//! Reply webhook -- `MessageProcessor` over HTTP.
//!
//! Each inbound message is POSTed as JSON to the configured endpoint, which
//! runs the chatbot pipeline and answers with `{"reply": "..."}` (or
//! `{"reply": null}` / `204 No Content` to stay silent).
//!
//! Requests carry `X-Linkbot-Timestamp` and, when a secret is configured, an
//! HMAC-SHA256 `X-Linkbot-Signature` over `{timestamp}.{body}` so the
//! receiver can authenticate them.

use std::time::Duration;

use chrono::Utc;
use linkbot_core::session::MessageProcessor;
use linkbot_types::config::ProcessorConfig;
use linkbot_types::error::ProcessError;
use linkbot_types::session::{CorrespondentId, SessionId};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// Longest error body echoed back in a `Rejected` error.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    session_id: &'a str,
    correspondent_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    #[serde(default)]
    reply: Option<String>,
}

struct WebhookTarget {
    client: reqwest::Client,
    url: String,
    secret: Option<SecretString>,
}

/// Message processor that delegates to an HTTP endpoint.
///
/// Without a `[processor]` section it is disabled and consumes every message
/// silently.
pub struct WebhookProcessor {
    target: Option<WebhookTarget>,
}

impl WebhookProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            target: Some(WebhookTarget {
                client,
                url: config.url.clone(),
                secret: config.secret.clone(),
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn from_config(config: Option<&ProcessorConfig>) -> Result<Self, reqwest::Error> {
        match config {
            Some(config) => Self::new(config),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }
}

impl MessageProcessor for WebhookProcessor {
    async fn process(
        &self,
        session: &SessionId,
        correspondent: &CorrespondentId,
        text: &str,
    ) -> Result<Option<String>, ProcessError> {
        let Some(target) = &self.target else {
            debug!(session_id = %session, "no reply processor configured, message consumed");
            return Ok(None);
        };

        let body = serde_json::to_vec(&ReplyRequest {
            session_id: session.as_str(),
            correspondent_id: correspondent.as_str(),
            text,
        })
        .map_err(|e| ProcessError::Failed(format!("failed to encode request: {e}")))?;
        let timestamp = Utc::now().timestamp().to_string();

        let mut request = target
            .client
            .post(&target.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(TIMESTAMP_HEADER, &timestamp);
        if let Some(secret) = &target.secret {
            let sig = signature::sign(secret.expose_secret().as_bytes(), &timestamp, &body)
                .map_err(|e| ProcessError::Failed(e.to_string()))?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={sig}"));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| ProcessError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| message.is_char_boundary(*i))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            return Err(ProcessError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ReplyResponse = response
            .json()
            .await
            .map_err(|e| ProcessError::InvalidResponse(e.to_string()))?;
        Ok(parsed.reply)
    }
}
